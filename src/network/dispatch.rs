//! Client message routing.
//!
//! One [`ClientHandler`] per connection. It remembers which player the
//! connection is bound to and turns decoded frames into registry calls.

use std::sync::Arc;

use tracing::debug;

use crate::game::action::ShapeAction;
use crate::game::seat::PlayerId;
use crate::network::connection::Connection;
use crate::network::protocol::{ClientMessage, NewPlayer, ProtocolError, ServerMessage};
use crate::network::registry::SessionRegistry;
use crate::network::session::{SessionError, SessionId};

/// Per-connection message handler.
pub struct ClientHandler {
    connection: Connection,
    registry: Arc<SessionRegistry>,
    bound: Option<PlayerId>,
}

impl ClientHandler {
    /// Create a handler for a freshly accepted connection.
    pub fn new(connection: Connection, registry: Arc<SessionRegistry>) -> Self {
        Self {
            connection,
            registry,
            bound: None,
        }
    }

    /// Player currently bound to this connection.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.bound
    }

    /// Handle one text frame. Bad frames get an error reply; nothing here is
    /// fatal to the connection.
    pub async fn handle_text(&mut self, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                debug!(connection = %self.connection.id(), "Invalid message: {}", e);
                self.reject(&e);
            }
        }
    }

    /// Reply to a frame type the protocol does not use.
    pub fn handle_unsupported(&self) {
        self.reject(&ProtocolError::UnsupportedFrame);
    }

    /// Handle a decoded client message.
    pub async fn handle_message(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Join { player, session_id } => {
                self.handle_join(player, session_id).await;
            }
            ClientMessage::Ready { player_id } => {
                if let Some(player_id) = self.resolve(&player_id) {
                    if let Err(e) = self.registry.set_ready(&player_id).await {
                        debug!(player = %player_id, "Ready ignored: {}", e);
                    }
                }
            }
            ClientMessage::Action { player_id, action } => {
                let action = match action.parse::<ShapeAction>() {
                    Ok(a) => a,
                    Err(e) => {
                        self.reject(&ProtocolError::from(e));
                        return;
                    }
                };
                if let Some(player_id) = self.resolve(&player_id) {
                    if !self.registry.dispatch_action(&player_id, action).await {
                        debug!(player = %player_id, %action, "Action dropped");
                    }
                }
            }
            ClientMessage::Leave { player_id } => {
                if let Some(player_id) = self.resolve(&player_id) {
                    self.registry.leave(&player_id).await;
                    self.bound = None;
                }
            }
        }
    }

    async fn handle_join(&mut self, player: NewPlayer, session_id: Option<String>) {
        let name = player.name.trim();
        if name.is_empty() {
            self.reject(&ProtocolError::EmptyName);
            return;
        }

        let session_id = match session_id.map(|s| s.parse::<SessionId>()) {
            None => None,
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                self.reject(&SessionError::SessionUnavailable);
                return;
            }
        };

        // A connection carries one player at a time
        let connection = self.connection.clone();
        let joined = match self.bound {
            Some(previous) => {
                self.registry
                    .rejoin(&previous, session_id, name, player.color, connection)
                    .await
            }
            None => {
                self.registry
                    .join(session_id, name, player.color, connection)
                    .await
            }
        };

        match joined {
            Ok(outcome) => self.bound = Some(outcome.player_id),
            Err(e) => self.reject(&e),
        }
    }

    /// Map a wire player id to the bound player. Anything else is treated as
    /// an unknown player and ignored.
    fn resolve(&self, raw: &str) -> Option<PlayerId> {
        let bound = self.bound?;
        match raw.parse::<PlayerId>() {
            Ok(id) if id == bound => Some(id),
            _ => {
                debug!(connection = %self.connection.id(), player_id = raw, "{}", SessionError::UnknownPlayer);
                None
            }
        }
    }

    fn reject(&self, error: &dyn std::error::Error) {
        self.connection.send(&ServerMessage::error(error.to_string()));
    }

    /// Connection closed: leave the bound player. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(player_id) = self.bound.take() {
            self.registry.leave(&player_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::SessionState;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handler(registry: &Arc<SessionRegistry>) -> (ClientHandler, mpsc::Receiver<Arc<str>>) {
        let (conn, rx) = Connection::channel(256);
        (ClientHandler::new(conn, registry.clone()), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(ServerMessage::from_json(&frame).unwrap());
        }
        out
    }

    fn join_frame(session_id: Option<&str>) -> String {
        match session_id {
            Some(id) => format!(
                r#"{{"type":"join","player":{{"name":"p","color":1}},"sessionId":"{}"}}"#,
                id
            ),
            None => r#"{"type":"join","player":{"name":"p","color":1}}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);

        h.handle_text("{nope").await;
        h.handle_text(r#"{"type":"dance"}"#).await;

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| matches!(m, ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn test_unknown_session_xyz() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);

        h.handle_text(&join_frame(Some("XYZ"))).await;

        assert_eq!(drain(&mut rx), vec![ServerMessage::error("Session unavailable")]);
        assert_eq!(registry.session_count().await, 0);
        assert!(h.player_id().is_none());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);

        h.handle_text(r#"{"type":"join","player":{"name":"  ","color":1}}"#).await;
        assert!(matches!(drain(&mut rx)[0], ServerMessage::Error { .. }));
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_action_named_in_error() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);
        h.handle_text(&join_frame(None)).await;
        let pid = h.player_id().unwrap();
        drain(&mut rx);

        h.handle_text(&format!(r#"{{"type":"action","playerId":"{}","action":"jump"}}"#, pid))
            .await;
        assert_eq!(drain(&mut rx), vec![ServerMessage::error("Invalid action: jump")]);
    }

    #[tokio::test]
    async fn test_foreign_player_id_ignored() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut a, mut ra) = handler(&registry);
        let (mut b, _rb) = handler(&registry);
        a.handle_text(&join_frame(None)).await;
        let a_id = a.player_id().unwrap();
        let session = registry.session_of(&a_id).await.unwrap();
        b.handle_text(&join_frame(Some(&session.to_string()))).await;
        drain(&mut ra);

        // b cannot ready or remove a
        b.handle_text(&format!(r#"{{"type":"leave","playerId":"{}"}}"#, a_id)).await;
        b.handle_text(&format!(r#"{{"type":"ready","playerId":"{}"}}"#, a_id)).await;
        assert_eq!(registry.session_players(&session).await.len(), 2);
        assert_eq!(registry.session_state(&session).await, Some(SessionState::Lobby));
        assert!(drain(&mut ra).is_empty());
    }

    #[tokio::test]
    async fn test_ready_then_action_then_leave() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);
        h.handle_text(&join_frame(None)).await;
        let pid = h.player_id().unwrap();
        let session = registry.session_of(&pid).await.unwrap();

        h.handle_text(&format!(r#"{{"type":"ready","playerId":"{}"}}"#, pid)).await;
        assert_eq!(registry.session_state(&session).await, Some(SessionState::Running));

        h.handle_text(&format!(r#"{{"type":"action","playerId":"{}","action":"rotate"}}"#, pid))
            .await;
        assert!(drain(&mut rx)
            .iter()
            .all(|m| !matches!(m, ServerMessage::Error { .. })));

        h.handle_text(&format!(r#"{{"type":"leave","playerId":"{}"}}"#, pid)).await;
        assert_eq!(registry.session_count().await, 0);

        // Close after an explicit leave is a no-op
        h.close().await;
        h.close().await;
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_leaves_previous_player() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, _rx) = handler(&registry);
        h.handle_text(&join_frame(None)).await;
        let first = h.player_id().unwrap();

        h.handle_text(&join_frame(None)).await;
        let second = h.player_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.session_of(&first).await, None);
        assert_eq!(registry.player_count().await, 1);
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_rejoin_keeps_player() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);
        h.handle_text(&join_frame(None)).await;
        let pid = h.player_id().unwrap();
        let session = registry.session_of(&pid).await.unwrap();
        drain(&mut rx);

        // Unknown target
        h.handle_text(&join_frame(Some(&SessionId::new().to_string()))).await;
        assert_eq!(drain(&mut rx), vec![ServerMessage::error("Session unavailable")]);
        assert_eq!(h.player_id(), Some(pid));
        assert_eq!(registry.session_of(&pid).await, Some(session));

        // Running target
        let (mut other, _ro) = handler(&registry);
        other.handle_text(&join_frame(None)).await;
        let other_id = other.player_id().unwrap();
        let running = registry.session_of(&other_id).await.unwrap();
        other
            .handle_text(&format!(r#"{{"type":"ready","playerId":"{}"}}"#, other_id))
            .await;
        assert_eq!(registry.session_state(&running).await, Some(SessionState::Running));

        h.handle_text(&join_frame(Some(&running.to_string()))).await;
        assert_eq!(drain(&mut rx), vec![ServerMessage::error("Session unavailable")]);
        assert_eq!(h.player_id(), Some(pid));
        assert_eq!(registry.session_players(&session).await, vec![pid]);
        assert_eq!(registry.session_players(&running).await, vec![other_id]);
    }

    #[tokio::test]
    async fn test_rejoin_own_lobby() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut h, mut rx) = handler(&registry);
        h.handle_text(&join_frame(None)).await;
        let first = h.player_id().unwrap();
        let session = registry.session_of(&first).await.unwrap();
        drain(&mut rx);

        h.handle_text(&join_frame(Some(&session.to_string()))).await;
        let second = h.player_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.session_players(&session).await, vec![second]);
        assert_eq!(registry.session_of(&first).await, None);
        assert!(matches!(drain(&mut rx)[0], ServerMessage::Joined { .. }));
    }

    #[tokio::test]
    async fn test_close_leaves_bound_player() {
        let registry = Arc::new(SessionRegistry::default());
        let (mut a, _ra) = handler(&registry);
        let (mut b, mut rb) = handler(&registry);
        a.handle_text(&join_frame(None)).await;
        let a_id = a.player_id().unwrap();
        let session = registry.session_of(&a_id).await.unwrap();
        b.handle_text(&join_frame(Some(&session.to_string()))).await;
        drain(&mut rb);

        a.close().await;
        let msg = tokio::time::timeout(Duration::from_secs(1), rb.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            ServerMessage::from_json(&msg).unwrap(),
            ServerMessage::PlayerLeft { player_id: a_id }
        );
    }
}
