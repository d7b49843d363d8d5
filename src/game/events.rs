//! World Events
//!
//! Changes emitted by a simulation tick. Each event carries only what a
//! client needs to replicate visual state.

use serde::{Deserialize, Serialize};

use crate::game::seat::PlayerId;
use crate::game::shape::Shape;

/// Final standing of one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Final score.
    pub points: u32,
    /// Final place (1-based).
    pub place: u32,
}

/// A world change produced by the simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A new shape entered the well.
    ShapeInserted {
        player_id: PlayerId,
        shape: Shape,
    },

    /// A shape moved, rotated or lost cells.
    ShapeUpdated {
        player_id: PlayerId,
        shape: Shape,
    },

    /// A shape left the well.
    ShapeRemoved {
        player_id: PlayerId,
        shape_id: u32,
    },

    /// A player's score changed.
    ScoreUpdated {
        player_id: PlayerId,
        points: u32,
    },

    /// Rows were cleared by a player's lock.
    LinesCleared {
        player_id: PlayerId,
        lines: Vec<u32>,
    },

    /// The game is over.
    GameOver {
        results: Vec<PlayerResult>,
    },
}

impl WorldEvent {
    /// Whether this event ends the game.
    pub fn is_game_over(&self) -> bool {
        matches!(self, WorldEvent::GameOver { .. })
    }
}

/// Rank players by points, highest first. Ties keep seat order.
pub fn rank_results(scores: &[(PlayerId, u32)]) -> Vec<PlayerResult> {
    let mut ordered: Vec<_> = scores.to_vec();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (player_id, points))| PlayerResult {
            player_id,
            points,
            place: (i + 1) as u32,
        })
        .collect()
}
