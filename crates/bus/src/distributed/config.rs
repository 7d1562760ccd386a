//! Distributed bus configuration

use serde::Deserialize;

/// Where this process publishes and which peer it listens to
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    pub enabled: bool,
    /// Address the local publisher binds, e.g. `127.0.0.1:5555`
    pub publish_address: String,
    /// Peer publisher to subscribe to, e.g. `127.0.0.1:5556`
    pub peer_address: String,
    /// Local event types forwarded to the peer
    pub relay_topics: Vec<String>,
    /// Remote event types pulled into the local bus
    pub import_topics: Vec<String>,
    /// Frames buffered per connected peer before dropping
    pub peer_queue_size: usize,
    /// Frames buffered on receive before dropping
    pub inbound_queue_size: usize,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            publish_address: "127.0.0.1:5555".to_string(),
            peer_address: "127.0.0.1:5556".to_string(),
            relay_topics: Vec::new(),
            import_topics: Vec::new(),
            peer_queue_size: 10000,
            inbound_queue_size: 10000,
        }
    }
}
