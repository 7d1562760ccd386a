//! Wire transport abstraction for the distributed bus
//!
//! A message is two parts: `[topic][payload]`. Publishers fan frames out to
//! peers whose joined topics match; subscribers join and leave topics and
//! yield matching frames. Delivery is at-most-once.

pub mod memory;
pub mod tcp;

use crate::error::TransportError;
use async_trait::async_trait;

/// Two-part wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Sends frames to whoever subscribed to their topic
#[async_trait]
pub trait WirePublisher: Send + Sync {
    async fn send(&self, message: WireMessage) -> Result<(), TransportError>;
}

/// Receives frames for joined topics
#[async_trait]
pub trait WireSubscriber: Send + Sync {
    /// Start receiving frames for `topic`
    async fn join(&self, topic: &str) -> Result<(), TransportError>;

    /// Stop receiving frames for `topic`
    async fn leave(&self, topic: &str) -> Result<(), TransportError>;

    /// Wait for the next frame. `None` once the transport is closed.
    async fn next(&self) -> Option<WireMessage>;
}

/// True if a frame on `topic` should reach a subscriber of `joined`.
///
/// Matches the exact topic, or a routed topic extending it with `.`:
/// `market.tick` matches `market.tick.s1` but not `market.ticker`.
pub fn topic_matches(joined: &str, topic: &str) -> bool {
    match topic.strip_prefix(joined) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_publisher_object_safe(_: &dyn WirePublisher) {}
    fn _assert_subscriber_object_safe(_: &dyn WireSubscriber) {}

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("market.tick", "market.tick"));
        assert!(topic_matches("market.tick", "market.tick.s1"));
        assert!(!topic_matches("market.tick", "market.ticker"));
        assert!(!topic_matches("market.tick.s1", "market.tick"));
        assert!(!topic_matches("order", "market.tick"));
    }
}
