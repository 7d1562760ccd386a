//! Handler registration tables

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::event::Event;

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Event callback. Runs on whichever thread dispatches the event, so it must
/// not block.
pub type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle returned by `subscribe`, used to unsubscribe
pub type SubscriptionId = u64;

#[derive(Clone)]
pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub handler: Handler,
}

/// Pattern -> handlers, for one dispatch mode
#[derive(Default)]
pub(crate) struct HandlerTable {
    by_pattern: DashMap<String, Vec<Subscription>>,
    patterns: DashMap<SubscriptionId, String>,
}

impl HandlerTable {
    /// Returns the existing id if this exact handler is already registered
    pub fn find(&self, pattern: &str, handler: &Handler) -> Option<SubscriptionId> {
        self.by_pattern.get(pattern).and_then(|subs| {
            subs.iter()
                .find(|s| Arc::ptr_eq(&s.handler, handler))
                .map(|s| s.id)
        })
    }

    pub fn insert(&self, pattern: &str, id: SubscriptionId, handler: Handler) {
        self.by_pattern
            .entry(pattern.to_string())
            .or_default()
            .push(Subscription { id, handler });
        self.patterns.insert(id, pattern.to_string());
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let Some((_, pattern)) = self.patterns.remove(&id) else {
            return false;
        };
        let mut emptied = false;
        if let Some(mut subs) = self.by_pattern.get_mut(&pattern) {
            subs.retain(|s| s.id != id);
            emptied = subs.is_empty();
        }
        if emptied {
            self.by_pattern.remove_if(&pattern, |_, subs| subs.is_empty());
        }
        true
    }

    /// Handlers for an event: exact type first, then the base type of a
    /// routed event. Cloned so dispatch runs without holding map locks.
    pub fn matching(&self, event: &Event) -> Vec<Subscription> {
        let mut out = Vec::new();
        if let Some(subs) = self.by_pattern.get(event.event_type()) {
            out.extend(subs.iter().cloned());
        }
        if event.route().is_some() {
            if let Some(subs) = self.by_pattern.get(event.base_type()) {
                out.extend(subs.iter().cloned());
            }
        }
        out
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.by_pattern.get(pattern).map(|subs| subs.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.patterns.len()
    }
}
