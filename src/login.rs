//! Login processor
//!
//! Asks for a display name until the user supplies one that is well formed
//! and not yet claimed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::Client;
use crate::error::{LoginRejection, ProcessError};
use crate::processor::Processor;
use crate::store::{Store, USERS_SET};

const PROMPT: &str = "Login Name?";

/// Check a proposed name against the naming rules
///
/// Only spaces and slashes are refused; everything else, the empty
/// string included, is accepted.
pub fn validate_username(name: &str) -> Result<(), LoginRejection> {
    if name.contains(' ') || name.contains('/') {
        return Err(LoginRejection::InvalidName);
    }
    Ok(())
}

pub struct LoginProcessor {
    store: Arc<dyn Store>,
    finished: bool,
}

impl LoginProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            finished: false,
        }
    }

    /// Validate and atomically reserve `name`
    async fn claim(&self, name: &str) -> Result<Result<(), LoginRejection>, ProcessError> {
        if let Err(rejection) = validate_username(name) {
            return Ok(Err(rejection));
        }
        if !self.store.add(USERS_SET, name).await? {
            return Ok(Err(LoginRejection::NameTaken));
        }
        Ok(Ok(()))
    }
}

#[async_trait]
impl Processor for LoginProcessor {
    fn name(&self) -> &'static str {
        "login"
    }

    async fn activate(&mut self, client: &mut Client) -> Result<(), ProcessError> {
        client.send(PROMPT).await?;
        Ok(())
    }

    async fn process(&mut self, client: &mut Client, line: &str) -> Result<(), ProcessError> {
        let name = line.trim();
        info!("Client {} proposed username '{}'", client.id, name);

        match self.claim(name).await? {
            Ok(()) => {
                client.set_username(name);
                client.send(format!("Welcome {}!", name)).await?;
                self.finished = true;
            }
            Err(rejection) => {
                info!("Client {} username '{}' refused: {}", client.id, name, rejection);
                client.send(rejection.to_string()).await?;
                client.send(PROMPT).await?;
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
