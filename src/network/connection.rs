//! Outbound connection handle.
//!
//! Each WebSocket gets a bounded channel drained by its own writer task.
//! Everything else in the server holds a cheap [`Connection`] clone and pushes
//! pre-serialized frames into it without waiting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::network::protocol::ServerMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, used in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of a client's outbound queue.
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Arc<str>>,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    pub fn channel(buffer: usize) -> (Connection, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        (Connection { id, sender }, receiver)
    }

    /// Connection number.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Serialize and queue a single message.
    pub fn send(&self, message: &ServerMessage) -> bool {
        match message.to_json() {
            Ok(text) => self.send_frame(Arc::from(text)),
            Err(e) => {
                error!(connection = %self.id, "Failed to serialize message: {}", e);
                false
            }
        }
    }

    /// Queue an already serialized frame. Never waits: a full queue drops the
    /// frame for this client only.
    pub fn send_frame(&self, frame: Arc<str>) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %self.id, "Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %self.id, "Connection closed, skipping frame");
                false
            }
        }
    }
}
