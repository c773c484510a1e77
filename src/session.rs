//! Per-connection session
//!
//! Owns the processor pipeline for one connection. Each input line goes to
//! the active processor; when it finishes, the next one is activated, and
//! once the pipeline is exhausted the connection is closed. A failing line
//! never ends the session.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::chat::ChatProcessor;
use crate::client::{Client, Outbound};
use crate::config::ChatConfig;
use crate::error::ProcessError;
use crate::login::LoginProcessor;
use crate::processor::{Processor, Stage};
use crate::store::Store;
use crate::types::ClientId;

/// Shown when a line could not be handled because of a backend failure
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again.";

/// Last message before the connection is closed
pub const CLOSING_NOTICE: &str = "Closing connection";

/// What the transport should do after a line was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct Session {
    client: Client,
    stage: Stage,
    login: LoginProcessor,
    chat: ChatProcessor,
}

impl Session {
    pub fn new(id: ClientId, store: Arc<dyn Store>, outbound: Outbound, config: &ChatConfig) -> Self {
        Self {
            client: Client::new(id, outbound),
            stage: Stage::LoggingIn,
            login: LoginProcessor::new(store.clone()),
            chat: ChatProcessor::new(store, config.default_room.clone()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.client.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The processor for the current stage, alongside the client it works on
    fn active(&mut self) -> (Option<&mut dyn Processor>, &mut Client) {
        let processor: Option<&mut dyn Processor> = match self.stage {
            Stage::LoggingIn => Some(&mut self.login),
            Stage::Chatting => Some(&mut self.chat),
            Stage::Closed => None,
        };
        (processor, &mut self.client)
    }

    /// Activate the first processor
    pub async fn start(&mut self) {
        info!("Client {} session started", self.client.id);
        self.activate_current().await;
    }

    /// Feed one input line through the pipeline
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if self.stage.is_closed() {
            debug!("Client {} sent input after close", self.client.id);
            return Flow::Close;
        }

        let (processor, client) = self.active();
        if let Some(processor) = processor {
            let label = processor.name();
            let outcome = processor.handle_input(client, line).await;
            if let Err(err) = outcome {
                self.report(label, err).await;
            }
        }
        self.cycle().await
    }

    /// Advance past finished processors
    async fn cycle(&mut self) -> Flow {
        loop {
            let finished = match self.active().0 {
                Some(processor) => processor.is_finished(),
                None => return Flow::Close,
            };
            if !finished {
                return Flow::Continue;
            }
            self.stage = self.stage.next();
            if self.activate_current().await == Flow::Close {
                return Flow::Close;
            }
        }
    }

    async fn activate_current(&mut self) -> Flow {
        let id = self.client.id;
        let (processor, client) = self.active();
        match processor {
            Some(processor) => {
                let label = processor.name();
                info!("Client {} activating {} processor", id, label);
                let outcome = processor.activate(client).await;
                if let Err(err) = outcome {
                    self.report(label, err).await;
                }
                Flow::Continue
            }
            None => {
                info!("Client {} pipeline finished", id);
                if self.client.send(CLOSING_NOTICE).await.is_err() {
                    debug!("Client {} gone before closing notice", id);
                }
                Flow::Close
            }
        }
    }

    /// Log a failed line and tell the user when it was our fault
    async fn report(&self, processor: &str, err: ProcessError) {
        let id = self.client.id;
        match err {
            ProcessError::Send(e) => {
                debug!("Client {} output closed in {} processor: {}", id, processor, e);
            }
            err => {
                error!("Client {} {} processor failed: {}", id, processor, err);
                if self.client.send(FAILURE_NOTICE).await.is_err() {
                    debug!("Client {} gone before failure notice", id);
                }
            }
        }
    }

    /// Stop the active processor; call when the connection goes away
    pub async fn shutdown(&mut self) {
        let id = self.client.id;
        let (processor, client) = self.active();
        if let Some(processor) = processor {
            let label = processor.name();
            match processor.stop(client).await {
                Ok(()) | Err(ProcessError::Send(_)) => {}
                Err(err) => error!("Client {} {} processor stop failed: {}", id, label, err),
            }
        }
        info!("Client {} session ended", id);
    }
}
