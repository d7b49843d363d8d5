//! Session Registry
//!
//! Owns every live session plus the player -> session index. All membership
//! changes go through here so the two indices never disagree.
//!
//! Lock order is registry index, then session. The tick task only ever holds
//! a session lock, and calls back into the registry after releasing it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::game::action::ShapeAction;
use crate::game::board::FallingBlocksFactory;
use crate::game::seat::PlayerId;
use crate::game::simulation::SimulationFactory;
use crate::network::connection::Connection;
use crate::network::player::Player;
use crate::network::protocol::{PlayerInfo, ServerMessage};
use crate::network::session::{GameSession, SessionError, SessionId, SessionState};
use crate::network::ticker::{spawn_tick_loop, TickConfig};

/// Shared handle to one session.
pub type SharedSession = Arc<Mutex<GameSession>>;

#[derive(Default)]
struct RegistryIndex {
    sessions: BTreeMap<SessionId, SharedSession>,
    player_sessions: BTreeMap<PlayerId, SessionId>,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The new player's id.
    pub player_id: PlayerId,
    /// Session joined or created.
    pub session_id: SessionId,
    /// Public view of the new player.
    pub player: PlayerInfo,
}

/// Registry of live sessions.
pub struct SessionRegistry {
    index: RwLock<RegistryIndex>,
    factory: Arc<dyn SimulationFactory>,
    tick_config: TickConfig,
}

impl SessionRegistry {
    /// Create a registry that builds simulations with `factory`.
    pub fn new(factory: Arc<dyn SimulationFactory>, tick_config: TickConfig) -> Self {
        Self {
            index: RwLock::new(RegistryIndex::default()),
            factory,
            tick_config,
        }
    }

    /// Allocate an empty lobby.
    pub async fn create_session(&self) -> SessionId {
        let id = SessionId::new();
        let mut index = self.index.write().await;
        index
            .sessions
            .insert(id, Arc::new(Mutex::new(GameSession::new(id))));
        debug!(session = %id, "Session created");
        id
    }

    /// Join a lobby, or create one when `session_id` is `None`.
    ///
    /// An unknown or non-lobby id fails without touching any state.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub async fn join(
        &self,
        session_id: Option<SessionId>,
        name: &str,
        color: u32,
        connection: Connection,
    ) -> Result<JoinOutcome, SessionError> {
        let mut index = self.index.write().await;
        Self::join_locked(&mut index, None, session_id, name, color, connection).await
    }

    /// Replace `previous` with a new player in one step. The old player is
    /// only removed once the target is known to accept the new one, so a
    /// failed rejoin leaves everything as it was.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub async fn rejoin(
        &self,
        previous: &PlayerId,
        session_id: Option<SessionId>,
        name: &str,
        color: u32,
        connection: Connection,
    ) -> Result<JoinOutcome, SessionError> {
        let mut index = self.index.write().await;
        Self::join_locked(&mut index, Some(previous), session_id, name, color, connection).await
    }

    async fn join_locked(
        index: &mut RegistryIndex,
        previous: Option<&PlayerId>,
        session_id: Option<SessionId>,
        name: &str,
        color: u32,
        connection: Connection,
    ) -> Result<JoinOutcome, SessionError> {
        let target = match session_id {
            Some(id) => {
                let session = index
                    .sessions
                    .get(&id)
                    .cloned()
                    .ok_or(SessionError::SessionUnavailable)?;
                let state = session.lock().await.state();
                if state != SessionState::Lobby {
                    return Err(SessionError::SessionUnavailable);
                }
                Some((id, session))
            }
            None => None,
        };

        if let Some(previous) = previous {
            let keep = target.as_ref().map(|(id, _)| *id);
            Self::remove_locked(index, previous, keep).await;
        }

        let (session_id, session) = target.unwrap_or_else(|| {
            let id = SessionId::new();
            (id, Arc::new(Mutex::new(GameSession::new(id))))
        });

        let mut guard = session.lock().await;
        let player = guard.add_player(Player::new(name, color, connection))?;
        let player_id = player.id;

        index.sessions.entry(session_id).or_insert_with(|| session.clone());
        index.player_sessions.insert(player_id, session_id);

        guard.broadcast(
            &ServerMessage::PlayerJoined {
                player: player.clone(),
            },
            Some(&player_id),
        );
        guard.send_to(
            &player_id,
            &ServerMessage::Joined {
                player_id,
                session_id,
                player: player.clone(),
            },
        );
        guard.send_to(
            &player_id,
            &ServerMessage::LobbyState {
                players: guard.roster(),
            },
        );

        info!(session = %session_id, player = %player_id, players = guard.player_count(), "Player joined");

        Ok(JoinOutcome {
            player_id,
            session_id,
            player,
        })
    }

    /// Remove a player. Returns false if the player was not tracked, so a
    /// second call is harmless.
    pub async fn leave(&self, player_id: &PlayerId) -> bool {
        let mut index = self.index.write().await;
        Self::remove_locked(&mut index, player_id, None).await
    }

    /// Drop a player from its session. An emptied session is torn down
    /// unless it is `keep`.
    async fn remove_locked(
        index: &mut RegistryIndex,
        player_id: &PlayerId,
        keep: Option<SessionId>,
    ) -> bool {
        let session_id = match index.player_sessions.remove(player_id) {
            Some(id) => id,
            None => return false,
        };
        let session = match index.sessions.get(&session_id).cloned() {
            Some(s) => s,
            None => return true,
        };

        let mut guard = session.lock().await;
        guard.remove_player(player_id);

        if guard.is_empty() && keep != Some(session_id) {
            guard.end();
            index.sessions.remove(&session_id);
            info!(session = %session_id, "Session emptied and removed");
        } else {
            guard.broadcast(
                &ServerMessage::PlayerLeft {
                    player_id: *player_id,
                },
                None,
            );
            info!(session = %session_id, player = %player_id, players = guard.player_count(), "Player left");
        }

        true
    }

    /// Mark a player ready. Starts the game when every player is ready and
    /// returns whether this call started it.
    pub async fn set_ready(self: &Arc<Self>, player_id: &PlayerId) -> Result<bool, SessionError> {
        let index = self.index.read().await;
        let session = Self::lookup(&index, player_id)?;

        let mut guard = session.lock().await;
        if !guard.set_ready(player_id)? {
            debug!(session = %guard.id, player = %player_id, "Player ready");
            return Ok(false);
        }

        let events = guard.start(self.factory.as_ref())?;
        guard.broadcast(
            &ServerMessage::GameStarted {
                players: guard.roster(),
            },
            None,
        );
        if guard.broadcast_events(events) {
            // Over before the first tick
            let session_id = guard.id;
            guard.end();
            drop(guard);
            drop(index);

            info!(session = %session_id, "Game over at start");
            self.finish_session(&session_id).await;
            return Ok(true);
        }

        let handle = spawn_tick_loop(self.clone(), session.clone(), guard.id, self.tick_config);
        guard.attach_tick_task(handle);

        info!(session = %guard.id, players = guard.player_count(), "Game started");
        Ok(true)
    }

    /// Forward an action to the player's running game. Returns whether it was
    /// queued.
    pub async fn dispatch_action(&self, player_id: &PlayerId, action: ShapeAction) -> bool {
        let session = {
            let index = self.index.read().await;
            match Self::lookup(&index, player_id) {
                Ok(s) => s,
                Err(_) => return false,
            }
        };

        let queued = session.lock().await.queue_action(player_id, action);
        queued
    }

    /// Remove an ended session and forget its players.
    pub async fn finish_session(&self, session_id: &SessionId) {
        let mut index = self.index.write().await;
        let session = match index.sessions.remove(session_id) {
            Some(s) => s,
            None => return,
        };

        let mut guard = session.lock().await;
        guard.end();
        for player_id in guard.detach_players() {
            index.player_sessions.remove(&player_id);
        }

        info!(session = %session_id, ticks = guard.ticks(), "Session finished");
    }

    /// Remove lobbies that have had no players for longer than `ttl`.
    /// Returns how many were removed.
    pub async fn reap_idle_sessions(&self, ttl: Duration) -> usize {
        let mut index = self.index.write().await;

        let mut idle = Vec::new();
        for (id, session) in index.sessions.iter() {
            let guard = session.lock().await;
            if guard.empty_for().map_or(false, |age| age >= ttl) {
                idle.push(*id);
            }
        }

        for id in &idle {
            if let Some(session) = index.sessions.remove(id) {
                session.lock().await.end();
            }
        }

        if !idle.is_empty() {
            info!(count = idle.len(), "Reaped idle sessions");
        }
        idle.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.index.read().await.sessions.len()
    }

    /// Get tracked player count.
    pub async fn player_count(&self) -> usize {
        self.index.read().await.player_sessions.len()
    }

    /// State of a session, if it exists.
    pub async fn session_state(&self, session_id: &SessionId) -> Option<SessionState> {
        let session = self.index.read().await.sessions.get(session_id).cloned()?;
        let state = session.lock().await.state();
        Some(state)
    }

    /// Session a player belongs to.
    pub async fn session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        self.index.read().await.player_sessions.get(player_id).copied()
    }

    /// Players of a session in join order.
    pub async fn session_players(&self, session_id: &SessionId) -> Vec<PlayerId> {
        let session = match self.index.read().await.sessions.get(session_id).cloned() {
            Some(s) => s,
            None => return Vec::new(),
        };
        let players = session.lock().await.player_ids();
        players
    }

    fn lookup(index: &RegistryIndex, player_id: &PlayerId) -> Result<SharedSession, SessionError> {
        index
            .player_sessions
            .get(player_id)
            .and_then(|id| index.sessions.get(id))
            .cloned()
            .ok_or(SessionError::UnknownPlayer)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(FallingBlocksFactory), TickConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::{rank_results, PlayerResult, WorldEvent};
    use crate::game::seat::SeatInfo;
    use crate::game::simulation::{Simulation, SimulationError};
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    type Inbox = mpsc::Receiver<Arc<str>>;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(FallingBlocksFactory),
            TickConfig {
                interval: Duration::from_millis(20),
                timeout: Duration::from_secs(1),
            },
        ))
    }

    async fn join(
        registry: &SessionRegistry,
        session_id: Option<SessionId>,
        name: &str,
    ) -> Result<(JoinOutcome, Inbox), SessionError> {
        let (conn, rx) = Connection::channel(256);
        registry.join(session_id, name, 0x123456, conn).await.map(|o| (o, rx))
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(ServerMessage::from_json(&frame).unwrap());
        }
        out
    }

    async fn recv(rx: &mut Inbox) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("channel closed");
        ServerMessage::from_json(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_join_creates_session() {
        let registry = registry();
        let (outcome, mut rx) = join(&registry, None, "ada").await.unwrap();

        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.session_of(&outcome.player_id).await, Some(outcome.session_id));
        assert_eq!(
            registry.session_state(&outcome.session_id).await,
            Some(SessionState::Lobby)
        );

        let msgs = drain(&mut rx);
        assert!(matches!(&msgs[0], ServerMessage::Joined { player_id, .. } if *player_id == outcome.player_id));
        assert!(matches!(&msgs[1], ServerMessage::LobbyState { players } if players.len() == 1));
        assert_eq!(msgs.len(), 2);
    }

    #[tokio::test]
    async fn test_join_existing_notifies_others() {
        let registry = registry();
        let (a, mut ra) = join(&registry, None, "a").await.unwrap();
        drain(&mut ra);

        let (b, mut rb) = join(&registry, Some(a.session_id), "b").await.unwrap();
        assert_eq!(b.session_id, a.session_id);
        assert_eq!(registry.session_count().await, 1);

        let to_a = drain(&mut ra);
        assert_eq!(to_a, vec![ServerMessage::PlayerJoined { player: b.player.clone() }]);

        let to_b = drain(&mut rb);
        assert!(matches!(&to_b[0], ServerMessage::Joined { .. }));
        assert_eq!(
            to_b[1],
            ServerMessage::LobbyState {
                players: vec![a.player.clone(), b.player.clone()]
            }
        );
    }

    #[tokio::test]
    async fn test_join_unknown_session_creates_nothing() {
        let registry = registry();
        let err = join(&registry, Some(SessionId::new()), "x").await.unwrap_err();

        assert_eq!(err, SessionError::SessionUnavailable);
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_running_session_rejected() {
        let registry = registry();
        let (a, _ra) = join(&registry, None, "a").await.unwrap();
        assert!(registry.set_ready(&a.player_id).await.unwrap());

        let err = join(&registry, Some(a.session_id), "late").await.unwrap_err();
        assert_eq!(err, SessionError::SessionUnavailable);
        assert_eq!(registry.session_players(&a.session_id).await, vec![a.player_id]);
        assert_eq!(registry.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = registry();
        let (a, _ra) = join(&registry, None, "a").await.unwrap();
        let (b, mut rb) = join(&registry, Some(a.session_id), "b").await.unwrap();
        drain(&mut rb);

        assert!(registry.leave(&a.player_id).await);
        assert!(!registry.leave(&a.player_id).await);

        assert_eq!(drain(&mut rb), vec![ServerMessage::PlayerLeft { player_id: a.player_id }]);
        assert_eq!(registry.session_players(&a.session_id).await, vec![b.player_id]);
        assert_eq!(registry.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_emptied_session_removed() {
        let registry = registry();
        let (a, _ra) = join(&registry, None, "a").await.unwrap();
        registry.set_ready(&a.player_id).await.unwrap();

        assert!(registry.leave(&a.player_id).await);
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.session_state(&a.session_id).await, None);
        assert!(!registry.dispatch_action(&a.player_id, ShapeAction::Rotate).await);
    }

    #[tokio::test]
    async fn test_late_joiner_blocks_start() {
        let registry = registry();
        let (a, _ra) = join(&registry, None, "a").await.unwrap();
        let (b, _rb) = join(&registry, Some(a.session_id), "b").await.unwrap();

        assert!(!registry.set_ready(&a.player_id).await.unwrap());
        let (c, _rc) = join(&registry, Some(a.session_id), "c").await.unwrap();
        assert!(!registry.set_ready(&b.player_id).await.unwrap());
        assert_eq!(registry.session_state(&a.session_id).await, Some(SessionState::Lobby));

        assert!(registry.set_ready(&c.player_id).await.unwrap());
        assert_eq!(registry.session_state(&a.session_id).await, Some(SessionState::Running));
    }

    #[tokio::test]
    async fn test_unknown_player_ready() {
        let registry = registry();
        assert_eq!(
            registry.set_ready(&PlayerId::new()).await.unwrap_err(),
            SessionError::UnknownPlayer
        );
    }

    #[tokio::test]
    async fn test_stale_action_dropped() {
        let registry = registry();
        let (a, _ra) = join(&registry, None, "a").await.unwrap();
        let (b, _rb) = join(&registry, Some(a.session_id), "b").await.unwrap();
        registry.set_ready(&a.player_id).await.unwrap();
        registry.set_ready(&b.player_id).await.unwrap();

        registry.leave(&a.player_id).await;
        assert!(!registry.dispatch_action(&a.player_id, ShapeAction::MoveLeft).await);
        assert!(registry.dispatch_action(&b.player_id, ShapeAction::MoveLeft).await);
        assert_eq!(registry.session_state(&a.session_id).await, Some(SessionState::Running));
    }

    #[tokio::test]
    async fn test_two_players_same_event_order() {
        let registry = registry();
        let (a, mut ra) = join(&registry, None, "a").await.unwrap();
        let (b, mut rb) = join(&registry, Some(a.session_id), "b").await.unwrap();
        drain(&mut ra);
        drain(&mut rb);

        registry.set_ready(&a.player_id).await.unwrap();
        registry.set_ready(&b.player_id).await.unwrap();

        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();
        for _ in 0..8 {
            seen_a.push(recv(&mut ra).await);
            seen_b.push(recv(&mut rb).await);
        }
        assert!(matches!(seen_a[0], ServerMessage::GameStarted { .. }));
        assert_eq!(seen_a, seen_b);

        // A drops; B is told and the game keeps running
        registry.leave(&a.player_id).await;
        let left = loop {
            match recv(&mut rb).await {
                msg @ ServerMessage::PlayerLeft { .. } => break msg,
                _ => continue,
            }
        };
        assert_eq!(left, ServerMessage::PlayerLeft { player_id: a.player_id });
        assert_eq!(registry.session_state(&a.session_id).await, Some(SessionState::Running));

        registry.leave(&b.player_id).await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_reap_idle_sessions() {
        let registry = registry();
        let idle = registry.create_session().await;
        let (a, _ra) = join(&registry, None, "a").await.unwrap();

        assert_eq!(registry.reap_idle_sessions(Duration::ZERO).await, 1);
        assert_eq!(registry.session_state(&idle).await, None);
        assert_eq!(registry.session_state(&a.session_id).await, Some(SessionState::Lobby));
    }

    struct FaultySimulation;

    impl Simulation for FaultySimulation {
        fn start(&mut self) -> Vec<WorldEvent> {
            Vec::new()
        }

        fn tick(&mut self) -> Result<Vec<WorldEvent>, SimulationError> {
            Err(SimulationError::Internal("boom".to_string()))
        }

        fn submit_action(&mut self, _seat: usize, _action: ShapeAction) {}

        fn remove_player(&mut self, _seat: usize) -> Vec<WorldEvent> {
            Vec::new()
        }
    }

    struct FaultyFactory;

    impl SimulationFactory for FaultyFactory {
        fn create(&self, _seats: &[SeatInfo], _seed: u64) -> Box<dyn Simulation> {
            Box::new(FaultySimulation)
        }
    }

    #[tokio::test]
    async fn test_simulation_fault_ends_session() {
        let faulty = Arc::new(SessionRegistry::new(
            Arc::new(FaultyFactory),
            TickConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(1),
            },
        ));
        let (a, mut ra) = join(&faulty, None, "a").await.unwrap();
        drain(&mut ra);
        faulty.set_ready(&a.player_id).await.unwrap();

        assert!(matches!(recv(&mut ra).await, ServerMessage::GameStarted { .. }));
        assert!(matches!(recv(&mut ra).await, ServerMessage::Error { .. }));
        assert_eq!(recv(&mut ra).await, ServerMessage::GameOver { results: None });

        // finish_session runs right after the broadcast
        for _ in 0..50 {
            if faulty.session_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(faulty.session_count().await, 0);
        assert_eq!(faulty.session_of(&a.player_id).await, None);
    }

    /// Ends the game after a fixed number of ticks; zero ends it at start.
    struct CountdownSimulation {
        seats: Vec<PlayerId>,
        remaining: u32,
    }

    impl CountdownSimulation {
        fn results(&self) -> WorldEvent {
            let scores: Vec<_> = self
                .seats
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, 100 * i as u32))
                .collect();
            WorldEvent::GameOver {
                results: rank_results(&scores),
            }
        }
    }

    impl Simulation for CountdownSimulation {
        fn start(&mut self) -> Vec<WorldEvent> {
            if self.remaining == 0 {
                vec![self.results()]
            } else {
                Vec::new()
            }
        }

        fn tick(&mut self) -> Result<Vec<WorldEvent>, SimulationError> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                Ok(vec![self.results()])
            } else {
                Ok(Vec::new())
            }
        }

        fn submit_action(&mut self, _seat: usize, _action: ShapeAction) {}

        fn remove_player(&mut self, _seat: usize) -> Vec<WorldEvent> {
            Vec::new()
        }
    }

    struct CountdownFactory(u32);

    impl SimulationFactory for CountdownFactory {
        fn create(&self, seats: &[SeatInfo], _seed: u64) -> Box<dyn Simulation> {
            Box::new(CountdownSimulation {
                seats: seats.iter().map(|s| s.player_id).collect(),
                remaining: self.0,
            })
        }
    }

    fn countdown_registry(ticks: u32) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(CountdownFactory(ticks)),
            TickConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(1),
            },
        ))
    }

    #[tokio::test]
    async fn test_game_over_at_start_ends_session() {
        let registry = countdown_registry(0);
        let (a, mut ra) = join(&registry, None, "a").await.unwrap();
        drain(&mut ra);

        assert!(registry.set_ready(&a.player_id).await.unwrap());

        let msgs = drain(&mut ra);
        assert!(matches!(msgs[0], ServerMessage::GameStarted { .. }));
        assert!(matches!(
            msgs.last(),
            Some(ServerMessage::GameOver { results: Some(r) }) if r.len() == 1
        ));
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.session_state(&a.session_id).await, None);
        assert_eq!(registry.session_of(&a.player_id).await, None);
        assert!(!registry.dispatch_action(&a.player_id, ShapeAction::MoveDown).await);
    }

    #[tokio::test]
    async fn test_game_over_from_tick_ends_session() {
        let registry = countdown_registry(3);
        let (a, mut ra) = join(&registry, None, "a").await.unwrap();
        let (b, mut rb) = join(&registry, Some(a.session_id), "b").await.unwrap();
        registry.set_ready(&a.player_id).await.unwrap();
        registry.set_ready(&b.player_id).await.unwrap();

        let mut finals = Vec::new();
        for rx in [&mut ra, &mut rb] {
            let last = loop {
                match recv(rx).await {
                    msg @ ServerMessage::GameOver { .. } => break msg,
                    _ => continue,
                }
            };
            finals.push(last);
        }

        let expected = ServerMessage::GameOver {
            results: Some(vec![
                PlayerResult {
                    player_id: b.player_id,
                    points: 100,
                    place: 1,
                },
                PlayerResult {
                    player_id: a.player_id,
                    points: 0,
                    place: 2,
                },
            ]),
        };
        assert_eq!(finals, vec![expected.clone(), expected]);

        for _ in 0..50 {
            if registry.session_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.player_count().await, 0);
        assert_eq!(registry.session_of(&a.player_id).await, None);
        assert_eq!(registry.session_of(&b.player_id).await, None);
        assert!(!registry.dispatch_action(&a.player_id, ShapeAction::Rotate).await);

        // game_over is the last frame either player gets
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut ra).is_empty());
        assert!(drain(&mut rb).is_empty());
    }

    #[tokio::test]
    async fn test_fault_isolated_to_one_session() {
        let healthy = registry();
        let (h, mut rh) = join(&healthy, None, "h").await.unwrap();
        healthy.set_ready(&h.player_id).await.unwrap();

        let faulty = Arc::new(SessionRegistry::new(
            Arc::new(FaultyFactory),
            TickConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(1),
            },
        ));
        let (f, _rf) = join(&faulty, None, "f").await.unwrap();
        faulty.set_ready(&f.player_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(faulty.session_count().await, 0);
        assert_eq!(healthy.session_state(&h.session_id).await, Some(SessionState::Running));
        assert!(!drain(&mut rh).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_joins_create_distinct_sessions(count in 1usize..12) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let registry = registry();
                let mut ids = std::collections::BTreeSet::new();
                let mut inboxes = Vec::new();
                for i in 0..count {
                    let (outcome, rx) = join(&registry, None, &format!("p{}", i)).await.unwrap();
                    ids.insert(outcome.session_id);
                    inboxes.push(rx);
                }
                assert_eq!(ids.len(), count);
                assert_eq!(registry.session_count().await, count);
            });
        }
    }
}
