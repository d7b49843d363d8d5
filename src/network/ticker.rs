//! Per-session tick loop.
//!
//! Drives one running session: each interval it takes the simulation out of
//! the session, steps it on a blocking worker under a deadline, puts it back
//! and broadcasts the step's events while still holding the session lock, so
//! every player sees the same order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::network::protocol::ServerMessage;
use crate::network::registry::{SessionRegistry, SharedSession};
use crate::network::session::{SessionError, SessionId, TickJob};

/// Tick scheduling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Longest a single tick may run before the session is faulted.
    pub timeout: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::DEFAULT_TICK_INTERVAL_MS),
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Spawn the tick loop for a session that just started running.
pub fn spawn_tick_loop(
    registry: Arc<SessionRegistry>,
    session: SharedSession,
    session_id: SessionId,
    config: TickConfig,
) -> JoinHandle<()> {
    tokio::spawn(run_tick_loop(registry, session, session_id, config))
}

async fn run_tick_loop(
    registry: Arc<SessionRegistry>,
    session: SharedSession,
    session_id: SessionId,
    config: TickConfig,
) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let TickJob {
            mut simulation,
            mut events,
        } = match session.lock().await.begin_tick() {
            Some(job) => job,
            None => break,
        };

        let step = timeout(
            config.timeout,
            tokio::task::spawn_blocking(move || {
                let result = simulation.tick();
                (simulation, result)
            }),
        )
        .await;

        let simulation = match step {
            Ok(Ok((simulation, Ok(tick_events)))) => {
                events.extend(tick_events);
                simulation
            }
            Ok(Ok((_, Err(e)))) => {
                fault(&registry, &session, session_id, e.to_string()).await;
                break;
            }
            Ok(Err(e)) => {
                fault(&registry, &session, session_id, format!("tick panicked: {}", e)).await;
                break;
            }
            Err(_) => {
                fault(&registry, &session, session_id, "tick timed out".to_string()).await;
                break;
            }
        };

        let mut guard = session.lock().await;
        if !guard.is_running() {
            break;
        }
        guard.finish_tick(simulation);

        if guard.broadcast_events(events) {
            guard.detach_tick_task();
            guard.end();
            drop(guard);

            info!(session = %session_id, "Game over");
            registry.finish_session(&session_id).await;
            break;
        }
    }

    debug!(session = %session_id, "Tick loop stopped");
}

/// Abort the game: tell everyone, end the session, release it.
async fn fault(
    registry: &SessionRegistry,
    session: &SharedSession,
    session_id: SessionId,
    reason: String,
) {
    let error = SessionError::SimulationFault(reason);
    warn!(session = %session_id, "{}", error);

    {
        let mut guard = session.lock().await;
        if !guard.is_running() {
            return;
        }
        guard.broadcast(&ServerMessage::error(error.to_string()), None);
        guard.broadcast(&ServerMessage::GameOver { results: None }, None);
        guard.detach_tick_task();
        guard.end();
    }

    registry.finish_session(&session_id).await;
}
