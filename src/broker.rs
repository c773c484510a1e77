//! Broker actor implementation
//!
//! The in-process store and bus: one task owns every set and every topic
//! subscription and processes commands strictly one at a time, so each
//! store operation is atomic with respect to all others.
//! `StoreHandle` is the cloneable client side.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{Store, Subscription};
use crate::types::SubscriptionId;

/// Channel buffer size for broker commands
const COMMAND_BUFFER_SIZE: usize = 256;

/// Commands sent from store handles to the broker actor
#[derive(Debug)]
pub enum BrokerCommand {
    Add {
        set: String,
        member: String,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        set: String,
        member: String,
        reply: oneshot::Sender<bool>,
    },
    Contains {
        set: String,
        member: String,
        reply: oneshot::Sender<bool>,
    },
    Cardinality {
        set: String,
        reply: oneshot::Sender<usize>,
    },
    Members {
        set: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Publish {
        topic: String,
        payload: String,
        reply: oneshot::Sender<usize>,
    },
    Subscribe {
        topic: String,
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        topic: String,
        id: SubscriptionId,
    },
}

/// The broker actor
///
/// Sets are dropped once empty, so an absent set and an empty set read
/// the same.
pub struct Broker {
    sets: HashMap<String, HashSet<String>>,
    topics: HashMap<String, HashMap<SubscriptionId, mpsc::Sender<String>>>,
    next_subscription: u64,
    /// Capacity of each subscriber's delivery queue
    subscription_buffer: usize,
    receiver: mpsc::Receiver<BrokerCommand>,
}

impl Broker {
    /// Create a new broker with the given command receiver
    pub fn new(receiver: mpsc::Receiver<BrokerCommand>, subscription_buffer: usize) -> Self {
        Self {
            sets: HashMap::new(),
            topics: HashMap::new(),
            next_subscription: 0,
            subscription_buffer: subscription_buffer.max(1),
            receiver,
        }
    }

    /// Start a broker task and return a handle to it
    pub fn spawn(subscription_buffer: usize) -> StoreHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        tokio::spawn(Broker::new(rx, subscription_buffer).run());
        StoreHandle { sender: tx }
    }

    /// Run the broker event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Broker started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Broker shutting down");
    }

    /// Process a single command
    ///
    /// A dropped reply receiver only means the caller gave up waiting.
    fn handle_command(&mut self, cmd: BrokerCommand) {
        match cmd {
            BrokerCommand::Add { set, member, reply } => {
                let _ = reply.send(self.handle_add(set, member));
            }
            BrokerCommand::Remove { set, member, reply } => {
                let _ = reply.send(self.handle_remove(&set, &member));
            }
            BrokerCommand::Contains { set, member, reply } => {
                let found = self.sets.get(&set).is_some_and(|s| s.contains(&member));
                let _ = reply.send(found);
            }
            BrokerCommand::Cardinality { set, reply } => {
                let _ = reply.send(self.sets.get(&set).map_or(0, HashSet::len));
            }
            BrokerCommand::Members { set, reply } => {
                let members = self
                    .sets
                    .get(&set)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
            BrokerCommand::Publish {
                topic,
                payload,
                reply,
            } => {
                let _ = reply.send(self.handle_publish(&topic, payload));
            }
            BrokerCommand::Subscribe { topic, reply } => {
                let _ = reply.send(self.handle_subscribe(topic));
            }
            BrokerCommand::Unsubscribe { topic, id } => {
                self.handle_unsubscribe(&topic, id);
            }
        }
    }

    fn handle_add(&mut self, set: String, member: String) -> bool {
        self.sets.entry(set).or_default().insert(member)
    }

    fn handle_remove(&mut self, set: &str, member: &str) -> bool {
        let Some(members) = self.sets.get_mut(set) else {
            return false;
        };
        let removed = members.remove(member);
        if members.is_empty() {
            self.sets.remove(set);
        }
        removed
    }

    /// Hand `payload` to every subscriber of `topic`
    ///
    /// Never waits on a subscriber: a full queue drops the message for
    /// that subscriber only, a closed one is pruned.
    fn handle_publish(&mut self, topic: &str, payload: String) -> usize {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|id, tx| match tx.try_send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Subscriber {} on '{}' is full, dropping message", id, topic);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Pruning closed subscriber {} on '{}'", id, topic);
                false
            }
        });

        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        delivered
    }

    fn handle_subscribe(&mut self, topic: String) -> Subscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (tx, rx) = mpsc::channel(self.subscription_buffer);
        self.topics.entry(topic.clone()).or_default().insert(id, tx);
        debug!("Subscriber {} joined topic '{}'", id, topic);

        Subscription {
            id,
            topic,
            receiver: rx,
        }
    }

    fn handle_unsubscribe(&mut self, topic: &str, id: SubscriptionId) {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return;
        };
        if subscribers.remove(&id).is_some() {
            debug!("Subscriber {} left topic '{}'", id, topic);
        }
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
    }
}

/// Cloneable handle to a running broker
#[derive(Debug, Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<BrokerCommand>,
}

impl StoreHandle {
    /// Send a command and wait for its reply
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> BrokerCommand,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)
    }
}

#[async_trait]
impl Store for StoreHandle {
    async fn add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.request(|reply| BrokerCommand::Add {
            set: set.to_string(),
            member: member.to_string(),
            reply,
        })
        .await
    }

    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.request(|reply| BrokerCommand::Remove {
            set: set.to_string(),
            member: member.to_string(),
            reply,
        })
        .await
    }

    async fn contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.request(|reply| BrokerCommand::Contains {
            set: set.to_string(),
            member: member.to_string(),
            reply,
        })
        .await
    }

    async fn cardinality(&self, set: &str) -> Result<usize, StoreError> {
        self.request(|reply| BrokerCommand::Cardinality {
            set: set.to_string(),
            reply,
        })
        .await
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.request(|reply| BrokerCommand::Members {
            set: set.to_string(),
            reply,
        })
        .await
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<usize, StoreError> {
        self.request(|reply| BrokerCommand::Publish {
            topic: topic.to_string(),
            payload,
            reply,
        })
        .await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        self.request(|reply| BrokerCommand::Subscribe {
            topic: topic.to_string(),
            reply,
        })
        .await
    }

    async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> Result<(), StoreError> {
        self.sender
            .send(BrokerCommand::Unsubscribe {
                topic: topic.to_string(),
                id,
            })
            .await
            .map_err(|_| StoreError::Unavailable)
    }
}
