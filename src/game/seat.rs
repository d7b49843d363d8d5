//! Player identity as seen by the simulation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique player token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Allocate a fresh random player id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw bytes (used for seed derivation).
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A player's place in the simulation, fixed when the game starts.
///
/// `seat` is the 0-based join-order index; the simulation only ever
/// addresses players by seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeatInfo {
    /// Join-order index.
    pub seat: usize,
    /// Player occupying the seat.
    pub player_id: PlayerId,
    /// Player color (0xRRGGBB).
    pub color: u32,
}
