//! Server configuration
//!
//! Loaded from a TOML file. Every field has a default, so an empty file
//! (or no file at all) yields a runnable server.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Listener and instance settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Instance id registered in the `servers` set (generated when absent).
    pub id: Option<String>,
    /// Line-protocol TCP listen address.
    pub listen: SocketAddr,
    /// Optional WebSocket listen address.
    pub websocket: Option<SocketAddr>,
    /// Longest accepted input line, in bytes.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            id: None,
            listen: SocketAddr::from(([127, 0, 0, 1], 9399)),
            websocket: None,
            max_line_length: 4096,
        }
    }
}

/// Chat behaviour settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Room every session joins right after login.
    pub default_room: String,
    /// Capacity of each session's outbound queue.
    pub outbound_buffer: usize,
    /// Capacity of each room subscription's delivery queue.
    pub subscription_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_room: "global".to_string(),
            outbound_buffer: 64,
            subscription_buffer: 64,
        }
    }
}

/// Logging settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "room_chat_server=info".to_string(),
        }
    }
}
