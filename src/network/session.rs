//! Game Session
//!
//! One session groups players from lobby to game over and owns the
//! simulation while the game runs. The registry serializes all membership
//! changes; this type only enforces the Lobby -> Running -> Ended lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::core::rng::derive_session_seed;
use crate::game::action::ShapeAction;
use crate::game::events::WorldEvent;
use crate::game::seat::{PlayerId, SeatInfo};
use crate::game::simulation::{Simulation, SimulationFactory};
use crate::network::player::Player;
use crate::network::protocol::{PlayerInfo, ServerMessage};

/// Unique session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw bytes (used for seed derivation).
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting joins, waiting for every player to ready up.
    Lobby,
    /// Game in progress.
    Running,
    /// Terminal.
    Ended,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Join targeted a missing or non-lobby session.
    #[error("Session unavailable")]
    SessionUnavailable,

    /// Player is not tracked (usually a just-departed player).
    #[error("Unknown player")]
    UnknownPlayer,

    /// The simulation failed during a tick.
    #[error("Simulation fault: {0}")]
    SimulationFault(String),
}

/// Input waiting for the next tick.
#[derive(Debug, Clone, Copy)]
enum PendingInput {
    Action(usize, ShapeAction),
    Departed(usize),
}

/// Work handed to the tick task for one step.
pub struct TickJob {
    /// The simulation, taken out of the session for the duration of the step.
    pub simulation: Box<dyn Simulation>,
    /// Events produced while applying departures, delivered before the step's own.
    pub events: Vec<WorldEvent>,
}

/// A game session.
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    state: SessionState,
    /// Players in join order.
    players: Vec<Player>,
    /// Seats fixed at game start.
    seats: BTreeMap<PlayerId, usize>,
    ticks: u64,
    simulation: Option<Box<dyn Simulation>>,
    pending: Vec<PendingInput>,
    tick_task: Option<JoinHandle<()>>,
    empty_since: Option<Instant>,
}

impl GameSession {
    /// Create an empty lobby.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Lobby,
            players: Vec::new(),
            seats: BTreeMap::new(),
            ticks: 0,
            simulation: None,
            pending: Vec::new(),
            tick_task: None,
            empty_since: Some(Instant::now()),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the game is running.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Whether no players remain.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Whether the player is a member.
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.players.iter().any(|p| p.id == *player_id)
    }

    /// Player ids in join order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Roster in join order.
    pub fn roster(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    /// How long the session has had no players.
    pub fn empty_for(&self) -> Option<Duration> {
        self.empty_since.map(|since| since.elapsed())
    }

    /// Add a player. Only lobbies accept players.
    pub fn add_player(&mut self, player: Player) -> Result<PlayerInfo, SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::SessionUnavailable);
        }

        let info = player.info();
        self.players.push(player);
        self.empty_since = None;
        Ok(info)
    }

    /// Remove a player. A seated player's departure is forwarded to the
    /// simulation on the next tick.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == *player_id)?;
        let player = self.players.remove(index);

        if self.state == SessionState::Running {
            if let Some(seat) = self.seats.get(player_id) {
                self.pending.push(PendingInput::Departed(*seat));
            }
        }

        if self.players.is_empty() {
            self.empty_since = Some(Instant::now());
        }

        Some(player)
    }

    /// Mark a player ready. Returns true when the session can start.
    pub fn set_ready(&mut self, player_id: &PlayerId) -> Result<bool, SessionError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == *player_id)
            .ok_or(SessionError::UnknownPlayer)?;
        player.ready = true;

        Ok(self.state == SessionState::Lobby && self.all_ready())
    }

    /// Check the whole roster, so a late joiner who is not ready holds the start.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    /// Lobby -> Running. Seats follow join order; the seed is derived from the
    /// session and player ids. Returns the simulation's opening events.
    pub fn start(&mut self, factory: &dyn SimulationFactory) -> Result<Vec<WorldEvent>, SessionError> {
        if self.state != SessionState::Lobby || !self.all_ready() {
            return Err(SessionError::SessionUnavailable);
        }

        let seats: Vec<SeatInfo> = self
            .players
            .iter()
            .enumerate()
            .map(|(seat, p)| SeatInfo {
                seat,
                player_id: p.id,
                color: p.color,
            })
            .collect();
        let player_bytes: Vec<[u8; 16]> = self.players.iter().map(|p| *p.id.as_bytes()).collect();
        let seed = derive_session_seed(self.id.as_bytes(), &player_bytes);

        let mut simulation = factory.create(&seats, seed);
        let events = simulation.start();

        self.seats = seats.iter().map(|s| (s.player_id, s.seat)).collect();
        self.simulation = Some(simulation);
        self.state = SessionState::Running;

        debug!(session = %self.id, seed, players = seats.len(), "Simulation created");
        Ok(events)
    }

    /// Queue an action for the next tick. No-op unless running.
    pub fn queue_action(&mut self, player_id: &PlayerId, action: ShapeAction) -> bool {
        if self.state != SessionState::Running || !self.contains(player_id) {
            return false;
        }

        match self.seats.get(player_id) {
            Some(seat) => {
                self.pending.push(PendingInput::Action(*seat, action));
                true
            }
            None => false,
        }
    }

    /// Take the simulation out for one step, with queued input applied.
    ///
    /// Returns `None` when the session is no longer running or a step is
    /// already in flight.
    pub fn begin_tick(&mut self) -> Option<TickJob> {
        if self.state != SessionState::Running {
            return None;
        }
        let mut simulation = self.simulation.take()?;

        let mut events = Vec::new();
        for input in self.pending.drain(..) {
            match input {
                PendingInput::Action(seat, action) => simulation.submit_action(seat, action),
                PendingInput::Departed(seat) => events.extend(simulation.remove_player(seat)),
            }
        }

        Some(TickJob { simulation, events })
    }

    /// Hand the simulation back after a step.
    pub fn finish_tick(&mut self, simulation: Box<dyn Simulation>) {
        self.ticks += 1;
        if self.state == SessionState::Running {
            self.simulation = Some(simulation);
        }
    }

    /// Send a message to every player, optionally skipping one. The message
    /// is serialized once.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<&PlayerId>) {
        let frame: Arc<str> = match message.to_json() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(session = %self.id, "Failed to serialize broadcast: {}", e);
                return;
            }
        };

        for player in &self.players {
            if exclude == Some(&player.id) {
                continue;
            }
            player.connection.send_frame(frame.clone());
        }
    }

    /// Send a message to one player.
    pub fn send_to(&self, player_id: &PlayerId, message: &ServerMessage) -> bool {
        self.players
            .iter()
            .find(|p| p.id == *player_id)
            .map(|p| p.connection.send(message))
            .unwrap_or(false)
    }

    /// Broadcast simulation events in order. Returns true if one of them ended
    /// the game.
    pub fn broadcast_events(&self, events: Vec<WorldEvent>) -> bool {
        let mut game_over = false;
        for event in events {
            game_over |= event.is_game_over();
            self.broadcast(&ServerMessage::from(event), None);
        }
        game_over
    }

    /// Remember the tick task so teardown can stop it.
    pub fn attach_tick_task(&mut self, handle: JoinHandle<()>) {
        self.tick_task = Some(handle);
    }

    /// Forget the tick task without stopping it. Used by the task itself
    /// before it ends the session.
    pub fn detach_tick_task(&mut self) {
        self.tick_task = None;
    }

    /// Move to Ended: stop the tick task and drop the simulation.
    /// Idempotent.
    pub fn end(&mut self) {
        self.state = SessionState::Ended;
        if let Some(handle) = self.tick_task.take() {
            handle.abort();
        }
        self.simulation = None;
        self.pending.clear();
    }

    /// Drop every player, returning their ids.
    pub fn detach_players(&mut self) -> Vec<PlayerId> {
        let ids = self.player_ids();
        self.players.clear();
        self.seats.clear();
        ids
    }
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("players", &self.players.len())
            .field("ticks", &self.ticks)
            .finish()
    }
}
