//! In-process event bus
//!
//! ```text
//!   publish(Sync) ──► monitors ──► sync + global handlers (caller thread)
//!
//!   publish(Async) ─► monitors ──► [async queue] ──► async worker ──► async handlers
//!
//!   post() ─────────► monitors ──► [sync queue] ───► sync worker ───► sync + global handlers
//!
//!   timer task ──────────────────► both queues (`timer` event)
//! ```
//!
//! Both queues are bounded. A full queue drops the event, logs a warning and
//! dispatches a `bus.queue_full` event inline; publishers never wait.

mod config;
mod handlers;
mod queue;
mod stats;

pub use config::BusConfig;
pub use handlers::{Handler, HandlerResult, SubscriptionId, handler};
pub use queue::{BoundedQueue, QueueItem};
pub use stats::BusStats;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::task::JoinHandle;

use crate::error::HandlerError;
use crate::event::{DispatchMode, Event, EventPayload, types};
use crate::messages::{QueueFull, QueueKind};
use handlers::{HandlerTable, Subscription};
use stats::BusCounters;

/// Result of a publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sync dispatch ran this many handlers
    Delivered(usize),
    /// Accepted by a queue
    Queued,
    /// Queue full; the event was discarded
    Dropped,
    /// Bus already shut down
    Closed,
}

pub struct EventBus {
    name: String,
    config: BusConfig,
    sync_handlers: HandlerTable,
    async_handlers: HandlerTable,
    global_handlers: RwLock<Vec<Subscription>>,
    monitors: RwLock<Vec<Subscription>>,
    sync_queue: BoundedQueue,
    async_queue: BoundedQueue,
    next_id: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    counters: BusCounters,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(name: impl Into<String>, config: BusConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sync_queue: BoundedQueue::new(config.sync_queue_size),
            async_queue: BoundedQueue::new(config.async_queue_size),
            config,
            sync_handlers: HandlerTable::default(),
            async_handlers: HandlerTable::default(),
            global_handlers: RwLock::new(Vec::new()),
            monitors: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            counters: BusCounters::default(),
            workers: Mutex::new(Vec::new()),
            timer: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the sync worker, the async worker and the timer.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("[BUS] {} already started", self.name);
            return;
        }

        let mut workers = self.workers.lock();
        let bus = Arc::clone(self);
        workers.push(tokio::spawn(async move { bus.run_sync_worker().await }));
        let bus = Arc::clone(self);
        workers.push(tokio::spawn(async move { bus.run_async_worker().await }));

        if let Some(period) = self.config.timer_interval() {
            let bus = Arc::clone(self);
            *self.timer.lock() = Some(tokio::spawn(async move {
                let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    bus.emit_timer();
                }
            }));
        }

        info!(
            "[BUS] {} started (sync queue {}, async queue {})",
            self.name,
            self.sync_queue.capacity(),
            self.async_queue.capacity()
        );
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register `handler` for events whose type equals `pattern`, or whose
    /// base type equals `pattern` when the event is routed.
    ///
    /// Registering the same handler again for the same pattern and mode is a
    /// no-op that returns the existing id. `"*"` registers a global handler.
    pub fn subscribe(&self, pattern: &str, handler: Handler, mode: DispatchMode) -> SubscriptionId {
        if pattern == types::WILDCARD {
            if mode == DispatchMode::Async {
                warn!("[BUS] global handlers are sync only; registering as sync");
            }
            return self.subscribe_global(handler);
        }

        let table = self.table(mode);
        if let Some(existing) = table.find(pattern, &handler) {
            warn!("[BUS] handler already subscribed to {} ({:?})", pattern, mode);
            return existing;
        }
        let id = self.next_id();
        table.insert(pattern, id, handler);
        debug!("[BUS] subscribed #{} to {} ({:?})", id, pattern, mode);
        id
    }

    /// Register a handler that receives every sync-dispatched event
    pub fn subscribe_global(&self, handler: Handler) -> SubscriptionId {
        let mut globals = self.global_handlers.write();
        if let Some(existing) = globals.iter().find(|s| Arc::ptr_eq(&s.handler, &handler)) {
            return existing.id;
        }
        let id = self.next_id();
        globals.push(Subscription { id, handler });
        id
    }

    /// Register a tap that sees every published event, whatever the mode
    pub fn add_monitor(&self, handler: Handler) -> SubscriptionId {
        let id = self.next_id();
        self.monitors.write().push(Subscription { id, handler });
        id
    }

    /// Remove a subscription, global handler or monitor. Returns false if the
    /// id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if self.sync_handlers.remove(id) || self.async_handlers.remove(id) {
            return true;
        }
        for list in [&self.global_handlers, &self.monitors] {
            let mut subs = list.write();
            let before = subs.len();
            subs.retain(|s| s.id != id);
            if subs.len() != before {
                return true;
            }
        }
        false
    }

    /// Handlers registered for exactly `pattern`, across both modes
    pub fn handler_count(&self, pattern: &str) -> usize {
        self.sync_handlers.count(pattern) + self.async_handlers.count(pattern)
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    pub fn publish(&self, event: Event, mode: DispatchMode) -> PublishOutcome {
        if self.closed.load(Ordering::SeqCst) {
            debug!(
                "[BUS] {} is shut down, ignoring {}",
                self.name,
                event.event_type()
            );
            return PublishOutcome::Closed;
        }

        self.counters.published(event.event_type());
        self.notify_monitors(&event);

        match mode {
            DispatchMode::Sync => {
                let delivered = self.dispatch_sync(&event);
                self.counters.sync_processed();
                PublishOutcome::Delivered(delivered)
            }
            DispatchMode::Async => match self.async_queue.push(event) {
                Ok(()) => PublishOutcome::Queued,
                Err(event) => {
                    self.report_overflow(QueueKind::Async, &event);
                    PublishOutcome::Dropped
                }
            },
        }
    }

    /// Hand an event to the sync worker. Safe to call from threads that are
    /// not allowed to run handlers inline.
    pub fn post(&self, event: Event) -> PublishOutcome {
        if self.closed.load(Ordering::SeqCst) {
            debug!(
                "[BUS] {} is shut down, ignoring {}",
                self.name,
                event.event_type()
            );
            return PublishOutcome::Closed;
        }

        self.counters.published(event.event_type());
        self.notify_monitors(&event);

        match self.sync_queue.push(event) {
            Ok(()) => PublishOutcome::Queued,
            Err(event) => {
                self.report_overflow(QueueKind::Sync, &event);
                PublishOutcome::Dropped
            }
        }
    }

    pub fn stats(&self) -> BusStats {
        let mut stats = self.counters.snapshot();
        stats.subscriptions = self.sync_handlers.total()
            + self.async_handlers.total()
            + self.global_handlers.read().len();
        stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Events waiting in (sync, async) queues
    pub fn queue_depths(&self) -> (usize, usize) {
        (self.sync_queue.len(), self.async_queue.len())
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop accepting events, let workers drain what is queued, and wait up
    /// to the shutdown timeout. Workers still running after that are left
    /// to finish on their own.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[BUS] {} shutting down", self.name);

        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.sync_queue.push_stop();
        self.async_queue.push_stop();

        let workers = std::mem::take(&mut *self.workers.lock());
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout();
        for worker in workers {
            if tokio::time::timeout_at(deadline, worker).await.is_err() {
                let (sync_left, async_left) = self.queue_depths();
                warn!(
                    "[BUS] {} worker did not stop within {:?}; abandoning ({} sync, {} async events left)",
                    self.name,
                    self.config.shutdown_timeout(),
                    sync_left,
                    async_left
                );
            }
        }
        info!("[BUS] {} stopped", self.name);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn next_id(&self) -> SubscriptionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn table(&self, mode: DispatchMode) -> &HandlerTable {
        match mode {
            DispatchMode::Sync => &self.sync_handlers,
            DispatchMode::Async => &self.async_handlers,
        }
    }

    fn notify_monitors(&self, event: &Event) {
        let monitors = self.monitors.read().clone();
        for monitor in &monitors {
            self.invoke(monitor, event);
        }
    }

    fn dispatch_sync(&self, event: &Event) -> usize {
        let mut subs = self.sync_handlers.matching(event);
        subs.extend(self.global_handlers.read().iter().cloned());
        for sub in &subs {
            self.invoke(sub, event);
        }
        subs.len()
    }

    fn dispatch_async(&self, event: &Event) -> usize {
        let subs = self.async_handlers.matching(event);
        for sub in &subs {
            self.invoke(sub, event);
        }
        subs.len()
    }

    /// Run one handler, containing both errors and panics
    fn invoke(&self, sub: &Subscription, event: &Event) {
        let outcome = catch_unwind(AssertUnwindSafe(|| (sub.handler)(event)))
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))));
        if let Err(e) = outcome {
            self.counters.handler_error();
            error!(
                "[BUS] handler #{} failed on {}: {}",
                sub.id,
                event.event_type(),
                e
            );
        }
    }

    fn report_overflow(&self, queue: QueueKind, dropped: &Event) {
        self.counters.dropped();
        let capacity = match queue {
            QueueKind::Sync => self.sync_queue.capacity(),
            QueueKind::Async => self.async_queue.capacity(),
        };
        warn!(
            "[BUS] {} {:?} queue full ({}), dropping {}",
            self.name,
            queue,
            capacity,
            dropped.event_type()
        );

        // Delivered inline so a full queue cannot swallow its own warning
        let notice = Event::new(EventPayload::QueueFull(QueueFull {
            queue,
            capacity,
            dropped_type: dropped.event_type().to_string(),
        }))
        .with_source(self.name.clone())
        .with_trace(dropped.trace_id());
        self.notify_monitors(&notice);
        self.dispatch_sync(&notice);
    }

    fn emit_timer(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let event = Event::new(EventPayload::Timer).with_source(self.name.clone());
        if let Err(event) = self.sync_queue.push(event.clone()) {
            self.report_overflow(QueueKind::Sync, &event);
        }
        if let Err(event) = self.async_queue.push(event) {
            self.report_overflow(QueueKind::Async, &event);
        }
    }

    async fn run_sync_worker(self: Arc<Self>) {
        debug!("[BUS] {} sync worker running", self.name);
        loop {
            match self.sync_queue.pop().await {
                QueueItem::Event(event) => {
                    self.dispatch_sync(&event);
                    self.counters.sync_processed();
                }
                QueueItem::Stop => break,
            }
        }
        debug!("[BUS] {} sync worker stopped", self.name);
    }

    async fn run_async_worker(self: Arc<Self>) {
        debug!("[BUS] {} async worker running", self.name);
        loop {
            match self.async_queue.pop().await {
                QueueItem::Event(event) => {
                    self.dispatch_async(&event);
                    self.counters.async_processed();
                }
                QueueItem::Stop => break,
            }
            // Let other tasks run between events on a busy queue
            tokio::task::yield_now().await;
        }
        debug!("[BUS] {} async worker stopped", self.name);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quiet_config() -> BusConfig {
        BusConfig {
            timer_interval_ms: 0,
            ..Default::default()
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>) -> Handler {
        let log = Arc::clone(log);
        handler(move |event| {
            let body = match event.payload() {
                EventPayload::Custom(custom) => custom.body.clone(),
                _ => event.event_type().to_string(),
            };
            log.lock().push(body);
            Ok(())
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new("test", quiet_config());

        for i in 0..1000 {
            let outcome = bus.publish(Event::custom("X", i.to_string()), DispatchMode::Sync);
            assert_eq!(outcome, PublishOutcome::Delivered(0));
        }

        assert_eq!(bus.handler_count("X"), 0);
        let stats = bus.stats();
        assert_eq!(stats.published, 1000);
        assert_eq!(stats.handler_errors, 0);
        assert_eq!(stats.by_type.get("X"), Some(&1000));
    }

    #[test]
    fn test_sync_handlers_run_before_return_in_order() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("X", recorder(&log), DispatchMode::Sync);

        for i in 0..50 {
            bus.publish(Event::custom("X", i.to_string()), DispatchMode::Sync);
            assert_eq!(log.lock().len(), i + 1);
        }

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(*log.lock(), expected);
    }

    #[test]
    fn test_duplicate_subscription_is_noop() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = recorder(&log);

        let first = bus.subscribe("X", Arc::clone(&h), DispatchMode::Sync);
        let second = bus.subscribe("X", h, DispatchMode::Sync);

        assert_eq!(first, second);
        assert_eq!(bus.handler_count("X"), 1);
        bus.publish(Event::custom("X", "once"), DispatchMode::Sync);
        assert_eq!(*log.lock(), vec!["once"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe("X", recorder(&log), DispatchMode::Sync);
        bus.subscribe("Y", recorder(&log), DispatchMode::Async);
        assert_eq!(bus.stats().subscriptions, 2);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.stats().subscriptions, 1);
        bus.publish(Event::custom("X", "ignored"), DispatchMode::Sync);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_routed_events_reach_base_and_exact_subscribers() {
        let bus = EventBus::new("test", quiet_config());
        let all = Arc::new(Mutex::new(Vec::new()));
        let s1 = Arc::new(Mutex::new(Vec::new()));
        let s2 = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("signal", recorder(&all), DispatchMode::Sync);
        bus.subscribe("signal.s1", recorder(&s1), DispatchMode::Sync);
        bus.subscribe("signal.s2", recorder(&s2), DispatchMode::Sync);

        bus.publish(Event::custom("signal", "for-s1").routed("s1"), DispatchMode::Sync);

        assert_eq!(*all.lock(), vec!["for-s1"]);
        assert_eq!(*s1.lock(), vec!["for-s1"]);
        assert!(s2.lock().is_empty());
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("X", handler(|_| Err(HandlerError::msg("boom"))), DispatchMode::Sync);
        bus.subscribe("X", handler(|_| panic!("handler blew up")), DispatchMode::Sync);
        bus.subscribe("X", recorder(&log), DispatchMode::Sync);

        let outcome = bus.publish(Event::custom("X", "still delivered"), DispatchMode::Sync);

        assert_eq!(outcome, PublishOutcome::Delivered(3));
        assert_eq!(*log.lock(), vec!["still delivered"]);
        assert_eq!(bus.stats().handler_errors, 2);
    }

    #[test]
    fn test_global_handler_and_monitor() {
        let bus = EventBus::new("test", quiet_config());
        let global = Arc::new(Mutex::new(Vec::new()));
        let monitored = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(types::WILDCARD, recorder(&global), DispatchMode::Sync);
        bus.add_monitor(recorder(&monitored));

        bus.publish(Event::custom("A", "a"), DispatchMode::Sync);
        bus.publish(Event::custom("B", "b"), DispatchMode::Async);

        // Global handlers only see sync dispatch; monitors see everything
        assert_eq!(*global.lock(), vec!["a"]);
        assert_eq!(*monitored.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_async_queue_overflow_drops_and_warns() {
        let bus = EventBus::new(
            "test",
            BusConfig {
                async_queue_size: 2,
                ..quiet_config()
            },
        );
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let warnings = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("X", recorder(&delivered), DispatchMode::Async);
        bus.subscribe(types::QUEUE_FULL, recorder(&warnings), DispatchMode::Sync);
        bus.start();

        // No await between publishes: the worker cannot drain in between
        assert_eq!(bus.publish(Event::custom("X", "1"), DispatchMode::Async), PublishOutcome::Queued);
        assert_eq!(bus.publish(Event::custom("X", "2"), DispatchMode::Async), PublishOutcome::Queued);
        assert_eq!(bus.publish(Event::custom("X", "3"), DispatchMode::Async), PublishOutcome::Dropped);
        assert_eq!(*warnings.lock(), vec![types::QUEUE_FULL]);

        bus.shutdown().await;
        assert_eq!(*delivered.lock(), vec!["1", "2"]);
        assert_eq!(bus.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_async_delivery_preserves_order() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("X", recorder(&log), DispatchMode::Async);
        bus.start();

        for i in 0..200 {
            bus.publish(Event::custom("X", i.to_string()), DispatchMode::Async);
        }
        bus.shutdown().await;

        let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn test_post_runs_on_sync_worker() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("X", recorder(&log), DispatchMode::Sync);
        bus.start();

        let handle = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || bus.post(Event::custom("X", "from thread")))
        };
        assert_eq!(handle.join().unwrap(), PublishOutcome::Queued);

        bus.shutdown().await;
        assert_eq!(*log.lock(), vec!["from thread"]);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_noop() {
        let bus = EventBus::new("test", quiet_config());
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("X", recorder(&log), DispatchMode::Sync);
        bus.start();
        bus.shutdown().await;

        assert_eq!(bus.publish(Event::custom("X", "late"), DispatchMode::Sync), PublishOutcome::Closed);
        assert_eq!(bus.post(Event::custom("X", "late")), PublishOutcome::Closed);
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_reaches_both_channels() {
        let bus = EventBus::new(
            "test",
            BusConfig {
                timer_interval_ms: 100,
                ..Default::default()
            },
        );
        let sync_ticks = Arc::new(Mutex::new(Vec::new()));
        let async_ticks = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(types::TIMER, recorder(&sync_ticks), DispatchMode::Sync);
        bus.subscribe(types::TIMER, recorder(&async_ticks), DispatchMode::Async);
        bus.start();

        tokio::time::sleep(Duration::from_millis(350)).await;
        bus.shutdown().await;

        assert_eq!(sync_ticks.lock().len(), 3);
        assert_eq!(async_ticks.lock().len(), 3);
    }
}
