//! Network Layer
//!
//! WebSocket gateway, session lifecycle and broadcast.
//! Game rules live behind the `Simulation` trait in `game/`.

pub mod connection;
pub mod dispatch;
pub mod player;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod ticker;

pub use connection::{Connection, ConnectionId};
pub use dispatch::ClientHandler;
pub use player::Player;
pub use protocol::{ClientMessage, PlayerInfo, ProtocolError, ServerMessage};
pub use registry::{JoinOutcome, SessionRegistry};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{GameSession, SessionError, SessionId, SessionState};
pub use ticker::TickConfig;
