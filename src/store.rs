//! Shared store and bus contract
//!
//! Named sets for membership bookkeeping plus topic publish/subscribe for
//! room fan-out. Processors only see this trait; `broker::StoreHandle` is
//! the in-process implementation.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::types::SubscriptionId;

/// Every display name ever claimed
pub const USERS_SET: &str = "users";
/// Every room ever joined
pub const ROOMS_SET: &str = "rooms";
/// Running server instances
pub const SERVERS_SET: &str = "servers";

/// True for names that would collide with the store's own sets
pub fn is_reserved_key(name: &str) -> bool {
    matches!(name, USERS_SET | ROOMS_SET | SERVERS_SET)
}

/// A live subscription to one topic
///
/// Published payloads arrive on `receiver`, independent of whatever task
/// created the subscription. The stream ends once the topic is unsubscribed.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: String,
    pub receiver: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Add `member` to `set`. Returns false if it was already present,
    /// which makes this the atomic reserve operation.
    async fn add(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove `member` from `set`. Returns false if it was absent.
    async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn contains(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn cardinality(&self, set: &str) -> Result<usize, StoreError>;

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Publish to every current subscriber of `topic`.
    /// Returns how many subscribers the payload was handed to.
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, StoreError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError>;

    async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("users"));
        assert!(is_reserved_key("rooms"));
        assert!(is_reserved_key("servers"));
        assert!(!is_reserved_key("global"));
        assert!(!is_reserved_key("Users"));
    }
}
