//! Client struct definition
//!
//! The per-connection identity and output handle that processors work
//! against. Everything written here lands on the connection's single
//! outbound queue.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SendError;
use crate::types::ClientId;

/// Sender half of a connection's outbound queue
///
/// One item is one message; multi-line replies are a single item so
/// they reach the transport intact.
pub type Outbound = mpsc::Sender<String>;

/// Connected client information
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Display name (None before login)
    pub username: Option<String>,
    /// Server → Client message channel
    pub sender: Outbound,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: Outbound) -> Self {
        Self {
            id,
            username: None,
            sender,
        }
    }

    /// Queue a message for this client
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: impl Into<String>) -> Result<(), SendError> {
        let msg = msg.into();
        debug!("Sent to {}: '{}'", self.id, msg);
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Get the display name for this client
    ///
    /// Returns the username if set, otherwise "anonymous".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }

    /// Rebind the client's display name
    pub fn set_username(&mut self, username: impl Into<String>) {
        let username = username.into();
        debug!(
            "Client {} changing username from '{}' to '{}'",
            self.id,
            self.display_name(),
            username
        );
        self.username = Some(username);
    }
}
