//! Room Chat Server - Entry Point
//!
//! Loads configuration, starts the broker actor and serves connections.

use std::env;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use room_chat_server::{Broker, ChatServer, Config, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config file path from command line, or built-in defaults
    let config = match env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    // Use RUST_LOG env var to override the configured filter
    // e.g., RUST_LOG=debug or RUST_LOG=room_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .init();

    let store: Arc<dyn Store> = Arc::new(Broker::spawn(config.chat.subscription_buffer));
    info!("Broker actor started");

    let server = ChatServer::new(config, store);
    info!("Starting server instance {}", server.server_id());
    server.run().await?;

    Ok(())
}
