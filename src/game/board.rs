//! Falling Blocks
//!
//! Reference rules engine behind the [`Simulation`] seam: one shared well in
//! which every seat steers its own falling tetromino. Shapes lock when they
//! land on the floor or on locked cells; full rows clear and the locking seat
//! scores. The game ends when a seat's next shape cannot enter the well.

use std::collections::{BTreeMap, VecDeque};

use crate::core::rng::DeterministicRng;
use crate::game::action::ShapeAction;
use crate::game::events::{rank_results, WorldEvent};
use crate::game::seat::{PlayerId, SeatInfo};
use crate::game::shape::{Shape, ShapeKind};
use crate::game::simulation::{Simulation, SimulationError, SimulationFactory};

/// Well width in cells.
pub const WELL_WIDTH: i32 = 10;

/// Well height in cells.
pub const WELL_HEIGHT: i32 = 20;

/// Base score per cleared line (scaled by lines squared).
pub const POINTS_PER_LINE: u32 = 100;

/// Actions buffered per seat between ticks; extras are dropped.
pub const MAX_QUEUED_ACTIONS: usize = 16;

/// What a candidate shape position runs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Obstacle {
    Wall,
    Floor,
    Locked,
    Active,
}

struct SeatState {
    player_id: PlayerId,
    color: u32,
    present: bool,
    points: u32,
    active: Option<Shape>,
    /// Kind held back while the spawn area is blocked by another seat.
    next: Option<ShapeKind>,
    queued: VecDeque<ShapeAction>,
}

struct LockedShape {
    owner: usize,
    shape: Shape,
}

/// Shared-well falling block game.
pub struct FallingBlocks {
    seats: Vec<SeatState>,
    locked: BTreeMap<u32, LockedShape>,
    bag: Vec<ShapeKind>,
    rng: DeterministicRng,
    next_shape_id: u32,
    ticks: u32,
    over: bool,
}

impl FallingBlocks {
    /// Create a game for the given seats.
    pub fn new(seats: &[SeatInfo], seed: u64) -> Self {
        Self {
            seats: seats
                .iter()
                .map(|info| SeatState {
                    player_id: info.player_id,
                    color: info.color,
                    present: true,
                    points: 0,
                    active: None,
                    next: None,
                    queued: VecDeque::new(),
                })
                .collect(),
            locked: BTreeMap::new(),
            bag: Vec::new(),
            rng: DeterministicRng::new(seed),
            next_shape_id: 1,
            ticks: 0,
            over: false,
        }
    }

    /// Whether the game has ended.
    pub fn is_over(&self) -> bool {
        self.over
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Score of a seat.
    pub fn points(&self, seat: usize) -> Option<u32> {
        self.seats.get(seat).map(|s| s.points)
    }

    /// The seat's falling shape, if any.
    pub fn active_shape(&self, seat: usize) -> Option<&Shape> {
        self.seats.get(seat).and_then(|s| s.active.as_ref())
    }

    /// Number of shapes resting in the well.
    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// Draw from a shuffled 7-bag.
    fn next_kind(&mut self) -> ShapeKind {
        if self.bag.is_empty() {
            let mut bag = ShapeKind::ALL.to_vec();
            self.rng.shuffle(&mut bag);
            self.bag = bag;
        }
        self.bag.pop().unwrap_or(ShapeKind::I)
    }

    /// Spawn column: each seat gets an equal lane, shape centered in it.
    fn spawn_column(&self, seat: usize, width: i32) -> i32 {
        let lanes = self.seats.len().max(1) as i32;
        let lane_start = seat as i32 * WELL_WIDTH / lanes;
        let lane_end = (seat as i32 + 1) * WELL_WIDTH / lanes;
        let centered = lane_start + (lane_end - lane_start - width) / 2;
        centered.clamp(0, (WELL_WIDTH - width).max(0))
    }

    /// Cells covered by locked shapes, row-major.
    fn occupancy(&self) -> Vec<bool> {
        let mut grid = vec![false; (WELL_WIDTH * WELL_HEIGHT) as usize];
        for entry in self.locked.values() {
            for (x, y) in entry.shape.occupied() {
                if (0..WELL_WIDTH).contains(&x) && (0..WELL_HEIGHT).contains(&y) {
                    grid[(y * WELL_WIDTH + x) as usize] = true;
                }
            }
        }
        grid
    }

    fn obstacle(&self, shape: &Shape, seat: usize, grid: &[bool]) -> Option<Obstacle> {
        for (x, y) in shape.occupied() {
            if x < 0 || x >= WELL_WIDTH || y < 0 {
                return Some(Obstacle::Wall);
            }
            if y >= WELL_HEIGHT {
                return Some(Obstacle::Floor);
            }
            if grid[(y * WELL_WIDTH + x) as usize] {
                return Some(Obstacle::Locked);
            }
        }

        let blocked_by_active = self
            .seats
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != seat)
            .filter_map(|(_, state)| state.active.as_ref())
            .any(|active| overlaps(shape, active));

        blocked_by_active.then_some(Obstacle::Active)
    }

    fn apply_action(&mut self, seat: usize, action: ShapeAction, events: &mut Vec<WorldEvent>) {
        let Some(current) = self.seats[seat].active.as_ref() else {
            return;
        };

        let candidate = match action {
            ShapeAction::MoveLeft => current.moved(-1, 0),
            ShapeAction::MoveRight => current.moved(1, 0),
            ShapeAction::MoveDown => current.moved(0, 1),
            ShapeAction::Rotate => current.rotated(),
        };

        let grid = self.occupancy();
        if self.obstacle(&candidate, seat, &grid).is_none() {
            events.push(WorldEvent::ShapeUpdated {
                player_id: self.seats[seat].player_id,
                shape: candidate.clone(),
            });
            self.seats[seat].active = Some(candidate);
        }
    }

    /// Gravity for one seat.
    fn step_seat(&mut self, seat: usize, events: &mut Vec<WorldEvent>) -> Result<(), SimulationError> {
        let Some(current) = self.seats[seat].active.clone() else {
            self.spawn(seat, events);
            return Ok(());
        };

        let grid = self.occupancy();
        let candidate = current.moved(0, 1);
        match self.obstacle(&candidate, seat, &grid) {
            None => {
                events.push(WorldEvent::ShapeUpdated {
                    player_id: self.seats[seat].player_id,
                    shape: candidate.clone(),
                });
                self.seats[seat].active = Some(candidate);
            }
            // Wait for the other seat's shape to move on
            Some(Obstacle::Active) => {}
            Some(Obstacle::Floor) | Some(Obstacle::Locked) => {
                self.lock(seat, events);
                self.spawn(seat, events);
            }
            Some(Obstacle::Wall) => {
                return Err(SimulationError::InvalidState(format!(
                    "shape {} left the well at ({}, {})",
                    current.id, current.pos_x, current.pos_y
                )));
            }
        }

        Ok(())
    }

    fn lock(&mut self, seat: usize, events: &mut Vec<WorldEvent>) {
        let Some(shape) = self.seats[seat].active.take() else {
            return;
        };
        self.locked.insert(shape.id, LockedShape { owner: seat, shape });

        let grid = self.occupancy();
        let full: Vec<i32> = (0..WELL_HEIGHT)
            .filter(|y| (0..WELL_WIDTH).all(|x| grid[(y * WELL_WIDTH + x) as usize]))
            .collect();
        if full.is_empty() {
            return;
        }

        let player_id = self.seats[seat].player_id;
        events.push(WorldEvent::LinesCleared {
            player_id,
            lines: full.iter().map(|y| *y as u32).collect(),
        });

        self.collapse_rows(&full, events);

        let cleared = full.len() as u32;
        let state = &mut self.seats[seat];
        state.points += cleared * cleared * POINTS_PER_LINE;
        events.push(WorldEvent::ScoreUpdated {
            player_id,
            points: state.points,
        });
    }

    /// Remove `rows` from every locked shape and drop the cells above them.
    fn collapse_rows(&mut self, rows: &[i32], events: &mut Vec<WorldEvent>) {
        let ids: Vec<u32> = self.locked.keys().copied().collect();

        for id in ids {
            let Some(entry) = self.locked.get(&id) else {
                continue;
            };
            let owner = self.seats[entry.owner].player_id;

            let remaining: Vec<(i32, i32)> = entry
                .shape
                .occupied()
                .filter(|(_, y)| !rows.contains(y))
                .map(|(x, y)| (x, y + rows.iter().filter(|row| **row > y).count() as i32))
                .collect();

            match entry.shape.from_cells(&remaining) {
                None => {
                    self.locked.remove(&id);
                    events.push(WorldEvent::ShapeRemoved {
                        player_id: owner,
                        shape_id: id,
                    });
                }
                Some(shape) if shape != entry.shape => {
                    events.push(WorldEvent::ShapeUpdated {
                        player_id: owner,
                        shape: shape.clone(),
                    });
                    if let Some(entry) = self.locked.get_mut(&id) {
                        entry.shape = shape;
                    }
                }
                Some(_) => {}
            }
        }

        // Falling shapes buried by the collapse are withdrawn and respawn later
        let grid = self.occupancy();
        for state in &mut self.seats {
            let buried = state.active.as_ref().is_some_and(|shape| {
                shape
                    .occupied()
                    .any(|(x, y)| grid.get((y * WELL_WIDTH + x) as usize).copied().unwrap_or(false))
            });
            if buried {
                if let Some(shape) = state.active.take() {
                    events.push(WorldEvent::ShapeRemoved {
                        player_id: state.player_id,
                        shape_id: shape.id,
                    });
                }
            }
        }
    }

    fn spawn(&mut self, seat: usize, events: &mut Vec<WorldEvent>) {
        if self.over || !self.seats[seat].present || self.seats[seat].active.is_some() {
            return;
        }

        let kind = match self.seats[seat].next.take() {
            Some(kind) => kind,
            None => self.next_kind(),
        };
        let cells = kind.cells();
        let width = cells.iter().map(|row| row.len()).max().unwrap_or(0) as i32;
        let shape = Shape::new(
            self.next_shape_id,
            cells,
            self.spawn_column(seat, width),
            0,
            self.seats[seat].color,
        );

        let grid = self.occupancy();
        match self.obstacle(&shape, seat, &grid) {
            None => {
                self.next_shape_id += 1;
                events.push(WorldEvent::ShapeInserted {
                    player_id: self.seats[seat].player_id,
                    shape: shape.clone(),
                });
                self.seats[seat].active = Some(shape);
            }
            Some(Obstacle::Active) => {
                self.seats[seat].next = Some(kind);
            }
            Some(_) => self.finish(events),
        }
    }

    fn finish(&mut self, events: &mut Vec<WorldEvent>) {
        self.over = true;
        let scores: Vec<_> = self.seats.iter().map(|s| (s.player_id, s.points)).collect();
        events.push(WorldEvent::GameOver {
            results: rank_results(&scores),
        });
    }
}

fn overlaps(a: &Shape, b: &Shape) -> bool {
    a.occupied().any(|cell| b.occupied().any(|other| other == cell))
}

impl Simulation for FallingBlocks {
    fn start(&mut self) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        for seat in 0..self.seats.len() {
            self.spawn(seat, &mut events);
        }
        events
    }

    fn tick(&mut self) -> Result<Vec<WorldEvent>, SimulationError> {
        let mut events = Vec::new();
        if self.over {
            return Ok(events);
        }
        self.ticks += 1;

        // Actions first, in arrival order per seat
        for seat in 0..self.seats.len() {
            let queued: Vec<_> = self.seats[seat].queued.drain(..).collect();
            for action in queued {
                self.apply_action(seat, action, &mut events);
            }
        }

        for seat in 0..self.seats.len() {
            if self.over {
                break;
            }
            if !self.seats[seat].present {
                continue;
            }
            self.step_seat(seat, &mut events)?;
        }

        Ok(events)
    }

    fn submit_action(&mut self, seat: usize, action: ShapeAction) {
        if let Some(state) = self.seats.get_mut(seat) {
            if state.present && state.queued.len() < MAX_QUEUED_ACTIONS {
                state.queued.push_back(action);
            }
        }
    }

    fn remove_player(&mut self, seat: usize) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        let Some(state) = self.seats.get_mut(seat) else {
            return events;
        };
        if !state.present {
            return events;
        }

        state.present = false;
        state.queued.clear();
        state.next = None;
        if let Some(shape) = state.active.take() {
            events.push(WorldEvent::ShapeRemoved {
                player_id: state.player_id,
                shape_id: shape.id,
            });
        }
        events
    }
}

/// Factory for [`FallingBlocks`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FallingBlocksFactory;

impl SimulationFactory for FallingBlocksFactory {
    fn create(&self, seats: &[SeatInfo], seed: u64) -> Box<dyn Simulation> {
        Box::new(FallingBlocks::new(seats, seed))
    }
}
