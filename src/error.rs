//! Error types for the chat server
//!
//! Fatal errors end a connection or the process; everything a single
//! input line can cause is recovered at the session boundary.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::config::ConfigError;

/// Application-level errors
///
/// Transport and bootstrap failures. These terminate a connection
/// (or the server, during startup).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store or bus operation failed during bootstrap
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Shared store and bus errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The broker is gone or did not answer
    #[error("store unavailable")]
    Unavailable,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Errors raised while a processor handles one line
///
/// Caught by the session; none of them ends the session.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// Envelope could not be encoded
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a proposed display name is refused
///
/// The display text is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginRejection {
    #[error("Usernames must be a single word of letters and numbers")]
    InvalidName,

    #[error("Sorry, name taken.")]
    NameTaken,
}
