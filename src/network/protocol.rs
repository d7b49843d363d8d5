//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! One JSON object per text frame, tagged by `type`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::action::UnknownAction;
use crate::game::events::{PlayerResult, WorldEvent};
use crate::game::seat::PlayerId;
use crate::game::shape::Shape;
use crate::network::session::SessionId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// Player and session ids stay raw strings here: an id that does not parse is
/// simply an id the server does not know, which is handled the same way as a
/// stale one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session, or create one when `session_id` is absent.
    #[serde(rename_all = "camelCase")]
    Join {
        player: NewPlayer,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Player is ready to start.
    #[serde(rename_all = "camelCase")]
    Ready { player_id: String },

    /// Player intent while the game runs.
    #[serde(rename_all = "camelCase")]
    Action { player_id: String, action: String },

    /// Player is leaving the session.
    #[serde(rename_all = "camelCase")]
    Leave { player_id: String },
}

/// Player details supplied on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayer {
    /// Display name.
    pub name: String,
    /// Color (0xRRGGBB).
    pub color: u32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join confirmation, sent to the joiner only.
    #[serde(rename_all = "camelCase")]
    Joined {
        player_id: PlayerId,
        session_id: SessionId,
        player: PlayerInfo,
    },

    /// Full roster, sent to the joiner after `Joined`.
    LobbyState { players: Vec<PlayerInfo> },

    /// Another player joined the lobby.
    PlayerJoined { player: PlayerInfo },

    /// A player left the session.
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },

    /// All players were ready; the game is running.
    GameStarted { players: Vec<PlayerInfo> },

    /// Shape entered the well.
    #[serde(rename_all = "camelCase")]
    InsertShape { player_id: PlayerId, shape: Shape },

    /// Shape changed.
    #[serde(rename_all = "camelCase")]
    UpdateShape { player_id: PlayerId, shape: Shape },

    /// Shape left the well.
    #[serde(rename_all = "camelCase")]
    RemoveShape { player_id: PlayerId, shape_id: u32 },

    /// Score changed.
    #[serde(rename_all = "camelCase")]
    UpdatePoints { player_id: PlayerId, points: u32 },

    /// Rows cleared.
    #[serde(rename_all = "camelCase")]
    ClearLines { player_id: PlayerId, lines: Vec<u32> },

    /// Game ended. Results are absent when the game was aborted.
    GameOver {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        results: Option<Vec<PlayerResult>>,
    },

    /// Error message.
    Error { message: String },

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Public view of a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Color (0xRRGGBB).
    pub color: u32,
}

impl ServerMessage {
    /// Build an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

impl From<WorldEvent> for ServerMessage {
    fn from(event: WorldEvent) -> Self {
        match event {
            WorldEvent::ShapeInserted { player_id, shape } => {
                ServerMessage::InsertShape { player_id, shape }
            }
            WorldEvent::ShapeUpdated { player_id, shape } => {
                ServerMessage::UpdateShape { player_id, shape }
            }
            WorldEvent::ShapeRemoved { player_id, shape_id } => {
                ServerMessage::RemoveShape { player_id, shape_id }
            }
            WorldEvent::ScoreUpdated { player_id, points } => {
                ServerMessage::UpdatePoints { player_id, points }
            }
            WorldEvent::LinesCleared { player_id, lines } => {
                ServerMessage::ClearLines { player_id, lines }
            }
            WorldEvent::GameOver { results } => ServerMessage::GameOver {
                results: Some(results),
            },
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Frame-level failures. Reported to the sender; never fatal.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not a valid client message.
    #[error("Invalid message format: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Action value outside the engine's action set.
    #[error(transparent)]
    InvalidAction(#[from] UnknownAction),

    /// Binary and other non-text frames are not part of the protocol.
    #[error("Unsupported frame type")]
    UnsupportedFrame,

    /// Join with an empty player name.
    #[error("Player name must not be empty")]
    EmptyName,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
