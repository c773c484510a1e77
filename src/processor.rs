//! Processor contract and pipeline stages
//!
//! A session feeds each input line to exactly one processor. Processors
//! run in a fixed order: login, then chat. When the active one reports
//! finished, the session moves to the next stage.

use async_trait::async_trait;

use crate::client::Client;
use crate::error::ProcessError;

/// One stage of the per-connection input pipeline
#[async_trait]
pub trait Processor: Send {
    /// Short label used in log lines
    fn name(&self) -> &'static str;

    /// Called once when this processor becomes the active one
    async fn activate(&mut self, client: &mut Client) -> Result<(), ProcessError>;

    /// Handle one input line
    async fn process(&mut self, client: &mut Client, line: &str) -> Result<(), ProcessError>;

    fn is_finished(&self) -> bool;

    /// Called when the connection goes away while this processor is active
    async fn stop(&mut self, _client: &mut Client) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Forward a line unless this processor has already finished
    async fn handle_input(&mut self, client: &mut Client, line: &str) -> Result<(), ProcessError> {
        if self.is_finished() {
            return Ok(());
        }
        self.process(client, line).await
    }
}

/// Position in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for a unique display name
    LoggingIn,
    /// In the chat engine
    Chatting,
    /// Pipeline exhausted; accepts no more input
    Closed,
}

impl Stage {
    /// The stage that follows once the current processor finishes
    pub fn next(self) -> Stage {
        match self {
            Stage::LoggingIn => Stage::Chatting,
            Stage::Chatting | Stage::Closed => Stage::Closed,
        }
    }

    pub fn is_closed(self) -> bool {
        self == Stage::Closed
    }
}
