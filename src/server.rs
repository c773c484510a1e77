//! ChatServer bootstrap
//!
//! Binds the configured listeners, registers this instance in the shared
//! `servers` set, accepts connections until shutdown is requested, then
//! deregisters.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::{handle_connection, handle_websocket};
use crate::store::{Store, SERVERS_SET};
use crate::types::ServerId;

/// Wire framing spoken on a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Newline-delimited text over TCP
    Lines,
    /// One text frame per line
    WebSocket,
}

pub struct ChatServer {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    server_id: ServerId,
}

impl ChatServer {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let server_id = ServerId::from_config(config.server.id.as_deref());
        Self {
            config: Arc::new(config),
            store,
            server_id,
        }
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), AppError> {
        let lines_listener = TcpListener::bind(self.config.server.listen).await?;
        info!("Chat server listening on {}", lines_listener.local_addr()?);

        let ws_listener = match self.config.server.websocket {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!("WebSocket listener on {}", listener.local_addr()?);
                Some(listener)
            }
            None => None,
        };

        self.register().await?;

        tokio::select! {
            _ = serve(lines_listener, Transport::Lines, self.store.clone(), self.config.clone()) => {}
            _ = serve_optional(ws_listener, Transport::WebSocket, self.store.clone(), self.config.clone()) => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
            }
        }

        self.deregister().await;
        Ok(())
    }

    async fn register(&self) -> Result<(), AppError> {
        self.store.add(SERVERS_SET, self.server_id.as_str()).await?;
        info!("Registered server instance {}", self.server_id);
        Ok(())
    }

    async fn deregister(&self) {
        match self.store.remove(SERVERS_SET, self.server_id.as_str()).await {
            Ok(_) => info!("Deregistered server instance {}", self.server_id),
            Err(e) => warn!("Failed to deregister {}: {}", self.server_id, e),
        }
    }
}

/// Connection accept loop
///
/// Spawns one handler task per accepted connection; never returns.
pub async fn serve(
    listener: TcpListener,
    transport: Transport,
    store: Arc<dyn Store>,
    config: Arc<Config>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New {:?} connection from {}", transport, addr);
                let store = store.clone();
                let config = config.clone();

                tokio::spawn(async move {
                    let result = match transport {
                        Transport::Lines => handle_connection(stream, store, config).await,
                        Transport::WebSocket => handle_websocket(stream, store, config).await,
                    };
                    if let Err(e) = result {
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

async fn serve_optional(
    listener: Option<TcpListener>,
    transport: Transport,
    store: Arc<dyn Store>,
    config: Arc<Config>,
) {
    match listener {
        Some(listener) => serve(listener, transport, store, config).await,
        None => std::future::pending().await,
    }
}
