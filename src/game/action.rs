//! Player Actions
//!
//! The closed set of intents a player can send while a game is running.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An action applied to the player's falling shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeAction {
    /// Shift one column left.
    MoveLeft,
    /// Shift one column right.
    MoveRight,
    /// Drop one row.
    MoveDown,
    /// Rotate clockwise.
    Rotate,
}

impl ShapeAction {
    /// Every action, in wire order.
    pub const ALL: [ShapeAction; 4] = [
        ShapeAction::MoveLeft,
        ShapeAction::MoveRight,
        ShapeAction::MoveDown,
        ShapeAction::Rotate,
    ];

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeAction::MoveLeft => "move-left",
            ShapeAction::MoveRight => "move-right",
            ShapeAction::MoveDown => "move-down",
            ShapeAction::Rotate => "rotate",
        }
    }
}

impl fmt::Display for ShapeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not part of [`ShapeAction::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ShapeAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
