//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Accepts clients, routes their frames to the session registry and drains
//! each client's outbound queue.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::board::FallingBlocksFactory;
use crate::game::simulation::SimulationFactory;
use crate::network::connection::Connection;
use crate::network::dispatch::ClientHandler;
use crate::network::protocol::ServerMessage;
use crate::network::registry::SessionRegistry;
use crate::network::ticker::TickConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time between simulation ticks.
    pub tick_interval: Duration,
    /// Longest a single tick may run.
    pub tick_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// How long an empty lobby survives before it is reaped.
    pub empty_session_ttl: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), crate::DEFAULT_PORT),
            max_connections: 1000,
            tick_interval: Duration::from_millis(crate::DEFAULT_TICK_INTERVAL_MS),
            tick_timeout: Duration::from_millis(2000),
            outbound_buffer: 256,
            empty_session_ttl: Duration::from_secs(60),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; unparseable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env_or("BIND_HOST", defaults.bind_addr.ip());
        let port = env_or("PORT", defaults.bind_addr.port());

        Self {
            bind_addr: SocketAddr::new(host, port),
            max_connections: env_or("MAX_CONNECTIONS", defaults.max_connections),
            tick_interval: Duration::from_millis(env_or(
                "TICK_INTERVAL_MS",
                defaults.tick_interval.as_millis() as u64,
            )),
            tick_timeout: Duration::from_millis(env_or(
                "TICK_TIMEOUT_MS",
                defaults.tick_timeout.as_millis() as u64,
            )),
            outbound_buffer: env_or("OUTBOUND_BUFFER", defaults.outbound_buffer),
            empty_session_ttl: Duration::from_secs(env_or(
                "EMPTY_SESSION_TTL_SECS",
                defaults.empty_session_ttl.as_secs(),
            )),
            version: defaults.version,
        }
    }

    fn tick_config(&self) -> TickConfig {
        TickConfig {
            interval: self.tick_interval,
            timeout: self.tick_timeout,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value {:?} for {}, using default", raw, key);
                default
            }
        },
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Decrements the live connection count when a connection task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session registry.
    registry: Arc<SessionRegistry>,
    /// Live connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server running the bundled falling-blocks game.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_simulation(config, Arc::new(FallingBlocksFactory))
    }

    /// Create a server running a custom simulation.
    pub fn with_simulation(config: ServerConfig, factory: Arc<dyn SimulationFactory>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(SessionRegistry::new(factory, config.tick_config()));

        Self {
            config,
            registry,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Game server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );

        let cleanup_registry = self.registry.clone();
        let ttl = self.config.empty_session_ttl;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_registry, ttl).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(self.connections.clone());

        let registry = self.registry.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;

            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (connection, mut outbound) = Connection::channel(buffer);
            let conn_id = connection.id();
            info!(connection = %conn_id, "Client {} connected", addr);

            // Writer task: ends once every Connection clone is gone
            let mut writer = tokio::spawn(async move {
                while let Some(frame) = outbound.recv().await {
                    if ws_sender.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut handler = ClientHandler::new(connection.clone(), registry);

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => handler.handle_text(&text).await,
                            Some(Ok(Message::Binary(_))) => handler.handle_unsupported(),
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(connection = %conn_id, "Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!(connection = %conn_id, "WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // Ping/pong are answered by tungstenite
                            Some(Ok(_)) => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        connection.send(&ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        });
                        break;
                    }
                }
            }

            handler.close().await;
            drop(handler);
            drop(connection);

            if timeout(Duration::from_secs(1), &mut writer).await.is_err() {
                writer.abort();
            }

            info!(connection = %conn_id, "Client {} cleaned up", addr);
        });
    }

    /// Periodically remove lobbies nobody joined.
    async fn run_cleanup_loop(registry: Arc<SessionRegistry>, ttl: Duration) {
        let period = ttl.max(Duration::from_secs(1));
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            ticker.tick().await;
            registry.reap_idle_sessions(ttl).await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.registry.session_count().await
    }
}
