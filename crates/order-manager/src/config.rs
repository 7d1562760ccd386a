//! Order pipeline configuration

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Session that orders are dispatched to
    pub gateway: String,
    /// Order actors; an order id always maps to the same one
    pub shards: usize,
    /// Account and position refresh period while the session is READY; 0 disables
    pub query_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gateway: "ctp".to_string(),
            shards: 4,
            query_interval_ms: 30000,
        }
    }
}

impl PipelineConfig {
    pub fn query_interval(&self) -> Option<Duration> {
        (self.query_interval_ms > 0).then(|| Duration::from_millis(self.query_interval_ms))
    }
}
