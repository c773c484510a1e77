//! Multi-room line chat server library
//!
//! Clients connect over newline-delimited TCP (or WebSocket), claim a unique
//! display name, land in a default room and exchange messages with everyone
//! else in that room.
//!
//! # Features
//! - Login with atomic, unique username reservation
//! - Room switching with join/leave notices
//! - Room and member listings
//! - Slash commands (`/join`, `/leave`, `/users`, `/room`, `/rooms`,
//!   `/nick`, `/whoami`, `/help`, `/quit`)
//! - Server instance registration
//!
//! # Architecture
//! - Each connection runs a `Session`: a fixed pipeline of processors
//!   (`LoginProcessor`, then `ChatProcessor`) advanced by a small state machine
//! - Room state and message fan-out go through the `Store` trait; `Broker`
//!   is an actor implementing it in-process with `mpsc` channels
//! - Every connection has exactly one writer task, fed by a queue shared by
//!   direct replies and room deliveries
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use room_chat_server::{Broker, ChatServer, Config, Store};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let store: Arc<dyn Store> = Arc::new(Broker::spawn(config.chat.subscription_buffer));
//!     ChatServer::new(config, store).run().await.unwrap();
//! }
//! ```

pub mod broker;
pub mod chat;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod handler;
pub mod login;
pub mod message;
pub mod processor;
pub mod room;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use broker::{Broker, StoreHandle};
pub use chat::ChatProcessor;
pub use client::Client;
pub use config::Config;
pub use error::{AppError, LoginRejection, ProcessError, SendError, StoreError};
pub use handler::{drive_session, handle_connection, handle_websocket};
pub use login::LoginProcessor;
pub use message::{Action, Envelope};
pub use processor::{Processor, Stage};
pub use server::{serve, ChatServer, Transport};
pub use session::{Flow, Session};
pub use store::{Store, Subscription};
pub use types::{ClientId, ServerId, SubscriptionId};
