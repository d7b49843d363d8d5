//! Stackline Session Server
//!
//! Serves multiplayer falling-blocks sessions over WebSocket.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stackline::{GameServer, ServerConfig, VERSION};

/// How long open connections get to say goodbye after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("Stackline Server v{}", VERSION);
    info!(
        "Tick interval: {} ms, max connections: {}",
        config.tick_interval.as_millis(),
        config.max_connections
    );

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("server failed")?;

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while server.connection_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("Server stopped");

    Ok(())
}
