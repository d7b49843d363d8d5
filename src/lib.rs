//! # Stackline Session Server
//!
//! Real-time multiplayer sessions over WebSocket. Players join a lobby, ready
//! up, and the server drives a shared simulation on a fixed tick, fanning its
//! events out to every player in the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       STACKLINE SERVER                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  core/              - Deterministic primitives               │
//! │  └── rng.rs         - Seeded PRNG and seed derivation        │
//! │                                                              │
//! │  game/              - Simulation boundary                    │
//! │  ├── simulation.rs  - Simulation / SimulationFactory traits  │
//! │  ├── events.rs      - World events and results               │
//! │  ├── shape.rs       - Tetromino geometry                     │
//! │  ├── action.rs      - Player actions                         │
//! │  └── board.rs       - Falling-blocks reference game          │
//! │                                                              │
//! │  network/           - Networking (non-deterministic)         │
//! │  ├── server.rs      - WebSocket accept loop and config       │
//! │  ├── dispatch.rs    - Per-connection message routing         │
//! │  ├── registry.rs    - Session and player indices             │
//! │  ├── session.rs     - Lobby / Running / Ended lifecycle      │
//! │  ├── ticker.rs      - Per-session tick loop                  │
//! │  ├── player.rs      - Player record                          │
//! │  ├── connection.rs  - Outbound frame queue                   │
//! │  └── protocol.rs    - JSON message types                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! A simulation is seeded from the session id and the seated player ids, so a
//! given session replays identically for identical action streams.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{PlayerId, Simulation, SimulationFactory, WorldEvent};
pub use network::{GameServer, ServerConfig, SessionId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen port
pub const DEFAULT_PORT: u16 = 8000;

/// Default time between simulation ticks (ms)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
