use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters kept by the bus
#[derive(Default)]
pub(crate) struct BusCounters {
    published: AtomicU64,
    sync_processed: AtomicU64,
    async_processed: AtomicU64,
    dropped: AtomicU64,
    handler_errors: AtomicU64,
    by_type: DashMap<String, u64>,
}

impl BusCounters {
    pub fn published(&self, event_type: &str) {
        self.published.fetch_add(1, Ordering::Relaxed);
        *self.by_type.entry(event_type.to_string()).or_insert(0) += 1;
    }

    pub fn sync_processed(&self) {
        self.sync_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn async_processed(&self) {
        self.async_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            sync_processed: self.sync_processed.load(Ordering::Relaxed),
            async_processed: self.async_processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            by_type: self
                .by_type
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            subscriptions: 0,
        }
    }
}

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub sync_processed: u64,
    pub async_processed: u64,
    pub dropped: u64,
    pub handler_errors: u64,
    pub by_type: HashMap<String, u64>,
    /// Live sync, async and global handlers
    pub subscriptions: usize,
}
