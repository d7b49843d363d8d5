//! Simulation Adapter
//!
//! The seam between session management and a rules engine. A session drives
//! its simulation one tick at a time and fans the returned events out
//! verbatim; it never looks inside them beyond spotting `GameOver`.

use thiserror::Error;

use crate::game::action::ShapeAction;
use crate::game::events::WorldEvent;
use crate::game::seat::SeatInfo;

/// Failure inside a simulation tick. Fatal for the owning session.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    /// The world reached a state the engine cannot continue from.
    #[error("invalid world state: {0}")]
    InvalidState(String),

    /// Any other engine failure.
    #[error("simulation failed: {0}")]
    Internal(String),
}

/// A running game world.
///
/// Implementations are driven from a blocking worker thread, hence `Send`.
pub trait Simulation: Send {
    /// Events emitted once when the game begins.
    fn start(&mut self) -> Vec<WorldEvent>;

    /// Advance one step. Returns the step's events in delivery order.
    fn tick(&mut self) -> Result<Vec<WorldEvent>, SimulationError>;

    /// Queue an action for the next tick. Actions for an unknown or departed
    /// seat are dropped.
    fn submit_action(&mut self, seat: usize, action: ShapeAction);

    /// The player in `seat` left. Returns the resulting world changes.
    fn remove_player(&mut self, seat: usize) -> Vec<WorldEvent>;
}

/// Builds one simulation per session.
pub trait SimulationFactory: Send + Sync {
    /// Create a simulation for the given seats (join order) and seed.
    fn create(&self, seats: &[SeatInfo], seed: u64) -> Box<dyn Simulation>;
}
