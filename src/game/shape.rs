//! Shapes
//!
//! A shape is a cell matrix anchored at a well position. Row `r`, column `c`
//! of the matrix covers well cell `(pos_x + c, pos_y + r)` when the entry is
//! non-zero.

use serde::{Deserialize, Serialize};

/// Cell matrix, rows of 0/1.
pub type CellMatrix = Vec<Vec<u8>>;

/// The seven tetromino kinds, named by letter.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl ShapeKind {
    /// All kinds, in bag order before shuffling.
    pub const ALL: [ShapeKind; 7] = [
        ShapeKind::I,
        ShapeKind::O,
        ShapeKind::T,
        ShapeKind::S,
        ShapeKind::Z,
        ShapeKind::J,
        ShapeKind::L,
    ];

    /// Spawn orientation of this kind.
    pub fn cells(&self) -> CellMatrix {
        let rows: &[&[u8]] = match self {
            ShapeKind::I => &[&[1, 1, 1, 1]],
            ShapeKind::O => &[&[1, 1], &[1, 1]],
            ShapeKind::T => &[&[1, 1, 1], &[0, 1, 0]],
            ShapeKind::S => &[&[0, 1, 1], &[1, 1, 0]],
            ShapeKind::Z => &[&[1, 1, 0], &[0, 1, 1]],
            ShapeKind::J => &[&[1, 0, 0], &[1, 1, 1]],
            ShapeKind::L => &[&[0, 0, 1], &[1, 1, 1]],
        };
        rows.iter().map(|row| row.to_vec()).collect()
    }
}

/// Visual state of one shape, exactly as clients replicate it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    /// Shape identifier, unique within a session.
    pub id: u32,
    /// Cell matrix.
    #[serde(rename = "type")]
    pub cells: CellMatrix,
    /// Column of the matrix's left edge.
    pub pos_x: i32,
    /// Row of the matrix's top edge.
    pub pos_y: i32,
    /// Color (0xRRGGBB).
    pub color: u32,
}

impl Shape {
    /// Create a shape.
    pub fn new(id: u32, cells: CellMatrix, pos_x: i32, pos_y: i32, color: u32) -> Self {
        Self {
            id,
            cells,
            pos_x,
            pos_y,
            color,
        }
    }

    /// Matrix width (longest row).
    pub fn width(&self) -> i32 {
        self.cells.iter().map(|row| row.len()).max().unwrap_or(0) as i32
    }

    /// Matrix height.
    pub fn height(&self) -> i32 {
        self.cells.len() as i32
    }

    /// Absolute well coordinates of every filled cell.
    pub fn occupied(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells.iter().enumerate().flat_map(move |(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, cell)| **cell != 0)
                .map(move |(c, _)| (self.pos_x + c as i32, self.pos_y + r as i32))
        })
    }

    /// Copy of this shape shifted by `(dx, dy)`.
    pub fn moved(&self, dx: i32, dy: i32) -> Shape {
        Shape {
            pos_x: self.pos_x + dx,
            pos_y: self.pos_y + dy,
            ..self.clone()
        }
    }

    /// Copy of this shape rotated a quarter turn clockwise.
    pub fn rotated(&self) -> Shape {
        let height = self.cells.len();
        let width = self.width() as usize;
        let cell = |r: usize, c: usize| self.cells[r].get(c).copied().unwrap_or(0);

        let cells = (0..width)
            .map(|r| (0..height).map(|c| cell(height - 1 - c, r)).collect())
            .collect();

        Shape {
            cells,
            ..self.clone()
        }
    }

    /// Rebuild this shape from a set of absolute cells, keeping `pos_x` and
    /// the matrix width. Returns `None` when no cells remain.
    pub fn from_cells(&self, cells: &[(i32, i32)]) -> Option<Shape> {
        let min_y = cells.iter().map(|(_, y)| *y).min()?;
        let max_y = cells.iter().map(|(_, y)| *y).max()?;
        let width = self.width() as usize;

        let mut matrix = vec![vec![0u8; width]; (max_y - min_y + 1) as usize];
        for (x, y) in cells {
            let c = (x - self.pos_x) as usize;
            let r = (y - min_y) as usize;
            if let Some(cell) = matrix.get_mut(r).and_then(|row| row.get_mut(c)) {
                *cell = 1;
            }
        }

        Some(Shape {
            cells: matrix,
            pos_y: min_y,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupied_cells() {
        let shape = Shape::new(1, ShapeKind::T.cells(), 3, 5, 0xff0000);
        let mut cells: Vec<_> = shape.occupied().collect();
        cells.sort();
        assert_eq!(cells, vec![(3, 5), (4, 5), (4, 6), (5, 5)]);
    }

    #[test]
    fn test_rotate_i_piece() {
        let shape = Shape::new(1, ShapeKind::I.cells(), 0, 0, 0);
        let rotated = shape.rotated();
        assert_eq!(rotated.width(), 1);
        assert_eq!(rotated.height(), 4);

        let back = rotated.rotated().rotated().rotated();
        assert_eq!(back.cells, shape.cells);
    }

    #[test]
    fn test_rotate_l_piece() {
        let shape = Shape::new(1, ShapeKind::L.cells(), 0, 0, 0);
        let rotated = shape.rotated();
        assert_eq!(rotated.cells, vec![vec![1, 0], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_from_cells_rebuilds_matrix() {
        let shape = Shape::new(7, ShapeKind::O.cells(), 4, 10, 0);
        let rebuilt = shape.from_cells(&[(4, 12), (5, 12)]).unwrap();
        assert_eq!(rebuilt.pos_y, 12);
        assert_eq!(rebuilt.pos_x, 4);
        assert_eq!(rebuilt.cells, vec![vec![1, 1]]);
        assert!(shape.from_cells(&[]).is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let shape = Shape::new(3, ShapeKind::O.cells(), 1, 2, 0x00ff00);
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["posX"], 1);
        assert_eq!(json["posY"], 2);
        assert_eq!(json["type"], serde_json::json!([[1, 1], [1, 1]]));
    }
}
