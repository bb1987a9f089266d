//! Multi-room WebSocket Chat Relay - Entry Point
//!
//! Starts the TCP listener and the shared coordinator, accepting connections.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{handle_connection, Coordinator, CoordinatorConfig, Directory, Registry};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // Coordinator tunables, overridable from the environment
    let mut config = CoordinatorConfig::default();
    if let Some(secs) = env::var("RELAY_GRACE_SECS").ok().and_then(|v| v.parse().ok()) {
        config.grace = Duration::from_secs(secs);
    }
    if let Some(len) = env::var("RELAY_CODE_LENGTH").ok().and_then(|v| v.parse().ok()) {
        config.code_length = len;
    }

    let registry = Arc::new(Registry::new());
    let directory = Arc::new(Directory::new());
    let coordinator = Coordinator::new(registry, directory, config);

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat relay listening on {}", addr);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let coordinator = coordinator.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, coordinator).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
