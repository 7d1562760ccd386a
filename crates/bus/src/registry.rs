//! Heartbeat-based service directory
//!
//! Services announce themselves with `service.register`, keep alive with
//! `service.heartbeat` and leave with `service.unregister`. A periodic sweep
//! drops services whose last heartbeat is older than the timeout and
//! publishes `service.failed` for each.

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::{EventBus, SubscriptionId, handler};
use crate::event::{DispatchMode, Event, EventPayload, types};
use crate::messages::{
    DiscoveryRequest, DiscoveryResponse, ServiceAction, ServiceFailure, ServiceInfo, ServiceRecord,
    ServiceStatus, ServiceUpdate,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub check_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 5000,
            timeout_ms: 10000,
        }
    }
}

struct Entry {
    record: ServiceRecord,
    last_seen: Instant,
}

pub struct ServiceRegistry {
    bus: Arc<EventBus>,
    config: RegistryConfig,
    services: DashMap<String, Entry>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    /// Create the registry and attach it to the bus. The sweep task starts
    /// only if called inside a tokio runtime.
    pub fn start(bus: Arc<EventBus>, config: RegistryConfig) -> Arc<Self> {
        let registry = Arc::new(Self {
            bus,
            config,
            services: DashMap::new(),
            subscriptions: Mutex::new(Vec::new()),
            sweeper: Mutex::new(None),
        });
        registry.attach();
        registry.spawn_sweeper();
        registry
    }

    fn attach(self: &Arc<Self>) {
        let mut ids = self.subscriptions.lock();
        for event_type in [
            types::SERVICE_REGISTER,
            types::SERVICE_UNREGISTER,
            types::SERVICE_HEARTBEAT,
            types::SERVICE_DISCOVERY,
        ] {
            let weak: Weak<Self> = Arc::downgrade(self);
            let id = self.bus.subscribe(
                event_type,
                handler(move |event| {
                    if let Some(registry) = weak.upgrade() {
                        registry.on_event(event);
                    }
                    Ok(())
                }),
                DispatchMode::Sync,
            );
            ids.push(id);
        }
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("[REGISTRY] no runtime; heartbeat sweep disabled");
            return;
        }
        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.check_interval_ms.max(1));
        *self.sweeper.lock() = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                match weak.upgrade() {
                    Some(registry) => {
                        registry.sweep();
                    }
                    None => break,
                }
            }
        }));
    }

    /// Detach from the bus and stop sweeping
    pub fn stop(&self) {
        for id in self.subscriptions.lock().drain(..) {
            self.bus.unsubscribe(id);
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
    }

    fn on_event(&self, event: &Event) {
        match event.payload() {
            EventPayload::ServiceRegister(info) => self.register(info.clone()),
            EventPayload::ServiceUnregister(name) => {
                self.unregister(&name.name);
            }
            EventPayload::ServiceHeartbeat(name) => {
                self.heartbeat(&name.name);
            }
            EventPayload::ServiceDiscovery(request) => self.answer_discovery(request),
            _ => {}
        }
    }

    pub fn register(&self, info: ServiceInfo) {
        let now = Utc::now();
        let name = info.name.clone();
        let record = ServiceRecord {
            info,
            status: ServiceStatus::Active,
            registered_at: now,
            last_heartbeat: now,
        };
        info!("[REGISTRY] registered {} ({})", name, record.info.kind);
        self.services.insert(
            name,
            Entry {
                record: record.clone(),
                last_seen: Instant::now(),
            },
        );
        self.announce(EventPayload::ServiceUpdated(ServiceUpdate {
            action: ServiceAction::Registered,
            record,
        }));
    }

    pub fn unregister(&self, name: &str) -> bool {
        match self.services.remove(name) {
            Some((_, entry)) => {
                info!("[REGISTRY] unregistered {}", name);
                self.announce(EventPayload::ServiceUpdated(ServiceUpdate {
                    action: ServiceAction::Unregistered,
                    record: entry.record,
                }));
                true
            }
            None => {
                warn!("[REGISTRY] unregister for unknown service {}", name);
                false
            }
        }
    }

    pub fn heartbeat(&self, name: &str) -> bool {
        match self.services.get_mut(name) {
            Some(mut entry) => {
                entry.last_seen = Instant::now();
                entry.record.last_heartbeat = Utc::now();
                entry.record.status = ServiceStatus::Active;
                debug!("[REGISTRY] heartbeat from {}", name);
                true
            }
            None => {
                warn!("[REGISTRY] heartbeat from unknown service {}", name);
                false
            }
        }
    }

    /// Records whose name contains `pattern`; empty pattern matches all
    pub fn discover(&self, pattern: &str) -> Vec<ServiceRecord> {
        let mut found: Vec<ServiceRecord> = self
            .services
            .iter()
            .filter(|entry| pattern.is_empty() || entry.key().contains(pattern))
            .map(|entry| entry.record.clone())
            .collect();
        found.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        found
    }

    fn answer_discovery(&self, request: &DiscoveryRequest) {
        let services = self.discover(&request.pattern);
        debug!(
            "[REGISTRY] discovery {} for '{}' -> {} services",
            request.request_id,
            request.pattern,
            services.len()
        );
        self.announce(EventPayload::ServiceDiscoveryResponse(DiscoveryResponse {
            request_id: request.request_id.clone(),
            services,
        }));
    }

    /// Remove services that missed the heartbeat timeout. Returns their names.
    pub fn sweep(&self) -> Vec<String> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let now = Instant::now();
        let expired: Vec<String> = self
            .services
            .iter()
            .filter(|entry| now.duration_since(entry.last_seen) > timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for name in &expired {
            if let Some((_, entry)) = self.services.remove(name) {
                warn!("[REGISTRY] {} missed heartbeats for {:?}, removing", name, timeout);
                let mut record = entry.record;
                record.status = ServiceStatus::Failed;
                self.announce(EventPayload::ServiceFailed(ServiceFailure {
                    record,
                    reason: format!("no heartbeat for {}ms", self.config.timeout_ms),
                }));
            }
        }
        expired
    }

    pub fn get(&self, name: &str) -> Option<ServiceRecord> {
        self.services.get(name).map(|entry| entry.record.clone())
    }

    pub fn list(&self) -> Vec<ServiceRecord> {
        self.discover("")
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn announce(&self, payload: EventPayload) {
        self.bus
            .publish(Event::new(payload).with_source("registry"), DispatchMode::Async);
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;
    use crate::messages::ServiceName;

    fn setup() -> (Arc<EventBus>, Arc<ServiceRegistry>, Arc<Mutex<Vec<Event>>>) {
        let bus = EventBus::new(
            "test",
            BusConfig {
                timer_interval_ms: 0,
                ..Default::default()
            },
        );
        let registry = ServiceRegistry::start(Arc::clone(&bus), RegistryConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for event_type in [
            types::SERVICE_UPDATED,
            types::SERVICE_FAILED,
            types::SERVICE_DISCOVERY_RESPONSE,
        ] {
            let seen = Arc::clone(&seen);
            bus.subscribe(
                event_type,
                handler(move |event| {
                    seen.lock().push(event.clone());
                    Ok(())
                }),
                DispatchMode::Async,
            );
        }
        bus.start();
        (bus, registry, seen)
    }

    fn register_event(name: &str) -> Event {
        Event::new(EventPayload::ServiceRegister(
            ServiceInfo::new(name, "gateway").with_capability("orders"),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_and_discover_via_bus() {
        let (bus, registry, seen) = setup();

        bus.publish(register_event("ctp-td"), DispatchMode::Sync);
        bus.publish(register_event("ctp-md"), DispatchMode::Sync);
        bus.publish(register_event("risk"), DispatchMode::Sync);
        bus.publish(
            Event::new(EventPayload::ServiceDiscovery(DiscoveryRequest {
                request_id: "q1".to_string(),
                pattern: "ctp".to_string(),
            })),
            DispatchMode::Sync,
        );
        bus.shutdown().await;

        assert_eq!(registry.len(), 3);
        let events = seen.lock();
        let response = events
            .iter()
            .find_map(|e| match e.payload() {
                EventPayload::ServiceDiscoveryResponse(r) => Some(r.clone()),
                _ => None,
            })
            .expect("discovery response");
        let names: Vec<_> = response.services.iter().map(|s| s.info.name.as_str()).collect();
        assert_eq!(names, vec!["ctp-md", "ctp-td"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_silent_services() {
        let (bus, registry, seen) = setup();
        bus.publish(register_event("alive"), DispatchMode::Sync);
        bus.publish(register_event("silent"), DispatchMode::Sync);

        // Keep one service alive across three sweep periods
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(4000)).await;
            bus.publish(
                Event::new(EventPayload::ServiceHeartbeat(ServiceName {
                    name: "alive".to_string(),
                })),
                DispatchMode::Sync,
            );
        }
        bus.shutdown().await;

        assert!(registry.get("alive").is_some());
        assert!(registry.get("silent").is_none());
        let failed: Vec<_> = seen
            .lock()
            .iter()
            .filter_map(|e| match e.payload() {
                EventPayload::ServiceFailed(f) => Some(f.record.info.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["silent"]);
    }

    #[tokio::test]
    async fn test_unregister_and_unknown_heartbeat() {
        let (bus, registry, _seen) = setup();
        bus.publish(register_event("svc"), DispatchMode::Sync);

        assert!(registry.unregister("svc"));
        assert!(!registry.unregister("svc"));
        assert!(!registry.heartbeat("svc"));
        assert!(registry.is_empty());
        bus.shutdown().await;
    }
}
