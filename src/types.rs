//! Basic type definitions for the chat server
//!
//! Newtype wrappers for the identifiers that travel between sessions,
//! the store and the wire:
//! - `ClientId`: UUID-based session identity, stamped on every envelope
//! - `ServerId`: identity of this server instance in the `servers` set
//! - `SubscriptionId`: broker-issued handle for one topic subscription

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4. The string form is what goes into the `user` field
/// of published envelopes, so it is also what the no-echo filter compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// True if `wire` is the string form of this id
    pub fn matches(&self, wire: &str) -> bool {
        Uuid::parse_str(wire).is_ok_and(|id| id == self.0)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server instance identifier
///
/// Supplied by configuration; a random one is generated when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(pub String);

impl ServerId {
    /// Use the configured id, or generate one
    pub fn from_config(configured: Option<&str>) -> Self {
        match configured.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self(id.to_string()),
            None => Self(Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a single topic subscription, issued by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_client_id_matches_wire_form() {
        let id = ClientId::new();
        assert!(id.matches(&id.to_string()));
        assert!(!id.matches(&ClientId::new().to_string()));
        assert!(!id.matches("not-a-uuid"));
    }

    #[test]
    fn test_server_id_from_config() {
        assert_eq!(ServerId::from_config(Some("node-1")).as_str(), "node-1");

        let generated = ServerId::from_config(None);
        assert!(Uuid::parse_str(generated.as_str()).is_ok());

        let blank = ServerId::from_config(Some("  "));
        assert!(Uuid::parse_str(blank.as_str()).is_ok());
    }
}
