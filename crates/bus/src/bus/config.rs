use serde::Deserialize;
use std::time::Duration;

/// Event bus tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the queue drained by the sync worker
    pub sync_queue_size: usize,
    /// Capacity of the queue drained by the async worker
    pub async_queue_size: usize,
    /// Period of the `timer` event; 0 disables it
    pub timer_interval_ms: u64,
    /// How long `shutdown` waits for workers before abandoning them
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            sync_queue_size: 1000,
            async_queue_size: 10000,
            timer_interval_ms: 1000,
            shutdown_timeout_ms: 3000,
        }
    }
}

impl BusConfig {
    pub fn timer_interval(&self) -> Option<Duration> {
        (self.timer_interval_ms > 0).then(|| Duration::from_millis(self.timer_interval_ms))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
