//! Component wiring
//!
//! Start order matters: the bus runs before anything subscribes, the
//! session exists before the pipeline (which reads its contract table),
//! and the distributed link comes last so relayed traffic only starts once
//! every local consumer is attached. Shutdown runs the other way round.

use hermes_bus::messages::{ServiceInfo, ServiceName};
use hermes_bus::{
    DistributedConfig, DistributedEventBus, DispatchMode, Event, EventBus, EventPayload,
    ServiceRegistry, TcpPublisher, TcpSubscriber, TransportError,
};
use hermes_gateway::{SessionHandle, SessionView, SimulatedVendor, callback_channel};
use hermes_order_manager::OrderPipeline;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::Result;

const PEER_CONNECT_ATTEMPTS: u32 = 10;
const PEER_CONNECT_DELAY: Duration = Duration::from_millis(500);

/// Why [`TradingEngine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    SessionEnded,
}

pub struct TradingEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    registry: Arc<ServiceRegistry>,
    vendor: Arc<SimulatedVendor>,
    session: SessionHandle,
    pipeline: OrderPipeline,
    distributed: Option<Arc<DistributedEventBus>>,
    services: Vec<String>,
    heartbeat: Option<JoinHandle<()>>,
}

impl TradingEngine {
    /// Build and start every component. The session is left DISCONNECTED;
    /// call [`TradingEngine::connect`] to begin the handshake.
    pub async fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new("hermes", config.bus.clone());
        bus.start();
        let registry = ServiceRegistry::start(Arc::clone(&bus), config.registry.clone());

        let (sink, inbox) = callback_channel();
        let vendor = Arc::new(config.simulator.build(sink));
        let session = SessionHandle::spawn(
            config.gateway.clone(),
            Arc::clone(&bus),
            vendor.clone(),
            inbox,
        );

        let pipeline = OrderPipeline::start(
            config.pipeline.clone(),
            config.risk.clone(),
            &bus,
            session.view(),
        )?;

        let distributed = if config.distributed.enabled {
            Some(link(&bus, &config.distributed).await?)
        } else {
            None
        };

        let mut engine = Self {
            config,
            bus,
            registry,
            vendor,
            session,
            pipeline,
            distributed,
            services: Vec::new(),
            heartbeat: None,
        };
        engine.announce();
        info!(
            "[ENGINE] Started (gateway {}, {} contracts in simulator, distributed {})",
            engine.config.gateway.name,
            engine.config.simulator.contracts.len(),
            engine.distributed.is_some()
        );
        Ok(engine)
    }

    pub fn connect(&self) {
        self.session.connect();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn vendor(&self) -> &Arc<SimulatedVendor> {
        &self.vendor
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn session_view(&self) -> SessionView {
        self.session.view()
    }

    pub fn pipeline(&self) -> &OrderPipeline {
        &self.pipeline
    }

    pub fn distributed(&self) -> Option<&Arc<DistributedEventBus>> {
        self.distributed.as_ref()
    }

    /// Run until Ctrl-C or until the session actor stops on its own
    pub async fn run(&mut self) -> Result<StopReason> {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("[ENGINE] Ctrl-C handler unavailable: {}", e);
                }
                info!("[ENGINE] Interrupted");
                Ok(StopReason::Interrupted)
            }
            outcome = self.session.join() => {
                outcome?;
                warn!("[ENGINE] Session {} ended", self.config.gateway.name);
                Ok(StopReason::SessionEnded)
            }
        }
    }

    pub async fn shutdown(mut self) {
        info!("[ENGINE] Shutting down");
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        for name in std::mem::take(&mut self.services) {
            self.publish(EventPayload::ServiceUnregister(ServiceName { name }));
        }
        if let Some(distributed) = self.distributed.take() {
            distributed.stop();
        }
        self.pipeline.shutdown().await;
        if let Err(e) = self.session.shutdown().await {
            error!("[ENGINE] Session stopped with error: {}", e);
        }
        self.registry.stop();
        self.bus.shutdown().await;
        info!("[ENGINE] Stopped");
    }

    /// Register the engine's components with the registry and keep them
    /// alive with heartbeats at half the registry timeout
    fn announce(&mut self) {
        let gateway = format!("gateway.{}", self.config.gateway.name);
        let services = [
            ServiceInfo::new(gateway.clone(), "gateway")
                .with_capability("orders")
                .with_capability("market_data"),
            ServiceInfo::new("risk_manager", "risk"),
            ServiceInfo::new("order_manager", "orders"),
            ServiceInfo::new("account_manager", "accounts"),
        ];
        for info in services {
            self.services.push(info.name.clone());
            self.publish(EventPayload::ServiceRegister(info));
        }

        let period = Duration::from_millis((self.config.registry.timeout_ms / 2).max(1));
        let bus = Arc::clone(&self.bus);
        let names = self.services.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                for name in &names {
                    bus.publish(
                        Event::new(EventPayload::ServiceHeartbeat(ServiceName { name: name.clone() }))
                            .with_source("engine"),
                        DispatchMode::Sync,
                    );
                }
            }
        }));
    }

    fn publish(&self, payload: EventPayload) {
        self.bus
            .publish(Event::new(payload).with_source("engine"), DispatchMode::Sync);
    }
}

/// Bind the local publisher, reach the peer and set up relay and imports
async fn link(bus: &Arc<EventBus>, config: &DistributedConfig) -> Result<Arc<DistributedEventBus>> {
    let publisher = TcpPublisher::bind(&config.publish_address, config.peer_queue_size).await?;
    info!("[ENGINE] Publishing on {}", publisher.local_addr());

    let subscriber = connect_peer(&config.peer_address, config.inbound_queue_size).await?;
    let distributed = DistributedEventBus::new(Arc::clone(bus), Arc::new(publisher), Arc::new(subscriber));
    distributed.start();
    for topic in &config.import_topics {
        distributed.import(topic).await?;
    }
    distributed.relay(config.relay_topics.clone(), config.peer_queue_size);
    Ok(distributed)
}

/// The peer may still be starting; retry a few times before giving up
async fn connect_peer(address: &str, queue_size: usize) -> std::result::Result<TcpSubscriber, TransportError> {
    let mut attempt = 1;
    loop {
        match TcpSubscriber::connect(address, queue_size).await {
            Ok(subscriber) => return Ok(subscriber),
            Err(e) if attempt < PEER_CONNECT_ATTEMPTS => {
                warn!(
                    "[ENGINE] Peer {} unreachable (attempt {}/{}): {}",
                    address, attempt, PEER_CONNECT_ATTEMPTS, e
                );
                attempt += 1;
                tokio::time::sleep(PEER_CONNECT_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}
