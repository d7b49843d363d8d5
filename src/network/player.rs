//! A participant in a session.

use crate::game::seat::PlayerId;
use crate::network::connection::Connection;
use crate::network::protocol::PlayerInfo;

/// A player connected to a session.
#[derive(Debug, Clone)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Color (0xRRGGBB).
    pub color: u32,
    /// Is player ready to start.
    pub ready: bool,
    /// Outbound channel to this player.
    pub connection: Connection,
}

impl Player {
    /// Create a not-ready player with a fresh id.
    pub fn new(name: impl Into<String>, color: u32, connection: Connection) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            color,
            ready: false,
            connection,
        }
    }

    /// Public view sent to clients.
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            color: self.color,
        }
    }
}
