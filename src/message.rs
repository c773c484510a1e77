//! Room envelope definitions
//!
//! Every chat event published to a room topic is one JSON envelope.
//! Receivers decode it and render a single line for their user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ClientId;

/// Kind of room event carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Ordinary chat line
    Talk,
    /// Someone entered the room
    Join,
    /// Someone left the room
    Leave,
}

/// Message published to a room topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender's session id
    pub user: String,
    /// Sender's display name
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub text: String,
}

impl Envelope {
    /// Build an envelope stamped with the current UTC time
    pub fn new(sender: ClientId, username: &str, action: Action, text: impl Into<String>) -> Self {
        Self {
            user: sender.to_string(),
            username: username.to_string(),
            timestamp: Utc::now(),
            action,
            text: text.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// True if this envelope was published by `id`
    pub fn is_from(&self, id: ClientId) -> bool {
        id.matches(&self.user)
    }

    /// The line shown to receiving members
    ///
    /// Join and leave notices already carry their full text.
    pub fn render(&self) -> String {
        match self.action {
            Action::Join | Action::Leave => self.text.clone(),
            Action::Talk => format!("{}: {}", self.username, self.text),
        }
    }
}
