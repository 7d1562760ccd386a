//! Distributed event bus
//!
//! Extends a local [`EventBus`] across a process boundary.
//!
//! ```text
//!   Process A                                   Process B
//!   ┌───────────┐  publish   ┌──────────┐       ┌──────────┐  next   ┌───────────┐
//!   │ EventBus  ├───────────►│ Publisher├──────►│Subscriber├────────►│ EventBus  │
//!   └───────────┘ [topic]    └──────────┘ TCP   └──────────┘ decode  └───────────┘
//!                 [event]                        ▲ JOIN/LEAVE
//!                                                │ (refcounted)
//! ```
//!
//! Topics are event types. Local subscriptions are reference counted per
//! pattern: the first one joins the topic on the wire, the last one leaves
//! it. Delivery is at-most-once; codec failures are logged and dropped.

pub mod codec;
pub mod config;
pub mod transport;

pub use config::DistributedConfig;

use log::{debug, info, warn};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::bus::{EventBus, Handler, SubscriptionId, handler};
use crate::error::{BusError, Result};
use crate::event::{DispatchMode, Event};
use transport::{WirePublisher, WireSubscriber, topic_matches};

pub struct DistributedEventBus {
    local: Arc<EventBus>,
    publisher: Arc<dyn WirePublisher>,
    subscriber: Arc<dyn WireSubscriber>,
    /// Joined pattern -> local references
    topics: Mutex<HashMap<String, usize>>,
    /// Local subscription -> pattern it holds a reference on
    subscriptions: Mutex<HashMap<SubscriptionId, String>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
    relay_monitor: SyncMutex<Option<SubscriptionId>>,
}

impl DistributedEventBus {
    pub fn new(
        local: Arc<EventBus>,
        publisher: Arc<dyn WirePublisher>,
        subscriber: Arc<dyn WireSubscriber>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            publisher,
            subscriber,
            topics: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            tasks: SyncMutex::new(Vec::new()),
            relay_monitor: SyncMutex::new(None),
        })
    }

    pub fn local(&self) -> &Arc<EventBus> {
        &self.local
    }

    /// Start the receive loop: frames are decoded and published on the
    /// local bus in async mode, in arrival order.
    pub fn start(&self) {
        let subscriber = Arc::clone(&self.subscriber);
        let local = Arc::clone(&self.local);
        let task = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match codec::decode(&message) {
                    Ok(event) => {
                        local.publish(event, DispatchMode::Async);
                    }
                    Err(e) => warn!("[DBUS] dropping frame on {}: {}", message.topic, e),
                }
            }
            info!("[DBUS] subscriber closed, receive loop ended");
        });
        self.tasks.lock().push(task);
    }

    /// Send an event to the peer. Failures are logged and the event dropped.
    pub async fn publish(&self, event: &Event) -> bool {
        send_event(self.publisher.as_ref(), event).await
    }

    /// Register a handler for remote events of `pattern`
    pub async fn subscribe(&self, pattern: &str, handler: Handler) -> Result<SubscriptionId> {
        let id = self.local.subscribe(pattern, handler, DispatchMode::Async);
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&id) {
            return Ok(id);
        }
        if let Err(e) = self.acquire(pattern).await {
            self.local.unsubscribe(id);
            return Err(e);
        }
        subscriptions.insert(id, pattern.to_string());
        Ok(id)
    }

    /// Remove a handler; leaves the topic when it was the last reference
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let pattern = self.subscriptions.lock().await.remove(&id);
        let removed = self.local.unsubscribe(id);
        if let Some(pattern) = pattern {
            self.release(&pattern).await?;
        }
        Ok(removed)
    }

    /// Pull remote events of `pattern` into the local bus without a handler
    /// of our own; existing local subscribers receive them.
    pub async fn import(&self, pattern: &str) -> Result<()> {
        self.acquire(pattern).await
    }

    /// Forward every local event matching one of `patterns` to the peer.
    /// Events that arrived from the wire are never sent back.
    pub fn relay(&self, patterns: Vec<String>, queue_size: usize) {
        if patterns.is_empty() {
            return;
        }
        let (tx, mut rx) = mpsc::channel::<Event>(queue_size.max(1));
        let monitor = self.local.add_monitor(handler(move |event| {
            if event.is_remote()
                || !patterns
                    .iter()
                    .any(|pattern| topic_matches(pattern, event.event_type()))
            {
                return Ok(());
            }
            if tx.try_send(event.clone()).is_err() {
                warn!("[DBUS] relay queue full, dropping {}", event.event_type());
            }
            Ok(())
        }));
        *self.relay_monitor.lock() = Some(monitor);

        let publisher = Arc::clone(&self.publisher);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                send_event(publisher.as_ref(), &event).await;
            }
        });
        self.tasks.lock().push(task);
    }

    /// Local references held on `pattern`
    pub async fn topic_refcount(&self, pattern: &str) -> usize {
        self.topics.lock().await.get(pattern).copied().unwrap_or(0)
    }

    pub fn stop(&self) {
        if let Some(monitor) = self.relay_monitor.lock().take() {
            self.local.unsubscribe(monitor);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn acquire(&self, pattern: &str) -> Result<()> {
        let mut topics = self.topics.lock().await;
        let count = topics.get(pattern).copied().unwrap_or(0);
        if count == 0 {
            self.subscriber
                .join(pattern)
                .await
                .map_err(BusError::Transport)?;
            debug!("[DBUS] joined {}", pattern);
        }
        topics.insert(pattern.to_string(), count + 1);
        Ok(())
    }

    async fn release(&self, pattern: &str) -> Result<()> {
        let mut topics = self.topics.lock().await;
        match topics.get(pattern).copied() {
            Some(1) => {
                topics.remove(pattern);
                self.subscriber
                    .leave(pattern)
                    .await
                    .map_err(BusError::Transport)?;
                debug!("[DBUS] left {}", pattern);
            }
            Some(count) => {
                topics.insert(pattern.to_string(), count - 1);
            }
            None => warn!("[DBUS] release of unreferenced topic {}", pattern),
        }
        Ok(())
    }
}

async fn send_event(publisher: &dyn WirePublisher, event: &Event) -> bool {
    let message = match codec::encode(event) {
        Ok(message) => message,
        Err(e) => {
            warn!("[DBUS] cannot encode {}: {}", event.event_type(), e);
            return false;
        }
    };
    match publisher.send(message).await {
        Ok(()) => true,
        Err(e) => {
            warn!("[DBUS] send of {} failed: {}", event.event_type(), e);
            false
        }
    }
}

impl Drop for DistributedEventBus {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
