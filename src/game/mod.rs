//! Game Logic Module
//!
//! The simulation boundary and the bundled reference rules engine.
//!
//! ## Module Structure
//!
//! - `seat`: Player ids and simulation seats
//! - `action`: Player intents
//! - `shape`: Shape geometry
//! - `events`: World-change events
//! - `simulation`: The `Simulation` / `SimulationFactory` seam
//! - `board`: Falling-block reference simulation

pub mod action;
pub mod board;
pub mod events;
pub mod seat;
pub mod shape;
pub mod simulation;

// Re-export key types
pub use action::{ShapeAction, UnknownAction};
pub use board::{FallingBlocks, FallingBlocksFactory};
pub use events::{PlayerResult, WorldEvent};
pub use seat::{PlayerId, SeatInfo};
pub use shape::Shape;
pub use simulation::{Simulation, SimulationError, SimulationFactory};
