//! Order pipeline assembly
//!
//! Wires the account manager, the risk gate and the order manager to one
//! bus and one gateway session.

use crate::account::AccountManager;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::manager::OrderManager;
use hermes_bus::messages::StrategySuspension;
use hermes_bus::{DispatchMode, Event, EventBus, EventPayload, SubscriptionId, handler, types};
use hermes_gateway::SessionView;
use hermes_risk_manager::{ExposureView, RiskConfig, RiskManager};
use log::debug;
use std::sync::Arc;

pub struct OrderPipeline {
    pub account: Arc<AccountManager>,
    pub risk: Arc<RiskManager>,
    pub orders: OrderManager,
    bus: Arc<EventBus>,
    error_feed: Option<SubscriptionId>,
}

impl OrderPipeline {
    pub fn start(
        config: PipelineConfig,
        risk: RiskConfig,
        bus: &Arc<EventBus>,
        session: SessionView,
    ) -> Result<Self> {
        let account = AccountManager::new(session.contracts().clone());
        account.attach(bus);
        if let Some(period) = config.query_interval() {
            account.start_polling(bus, config.gateway.clone(), period, session.clone());
        }

        let exposure: Arc<dyn ExposureView> = account.clone();
        let risk = Arc::new(RiskManager::new(risk, exposure)?);
        let error_feed = follow_strategy_errors(bus, &risk);
        let weak_bus = Arc::downgrade(bus);
        risk.start_monitor(move |suspension| {
            let Some(bus) = weak_bus.upgrade() else {
                return;
            };
            let strategy = suspension.strategy_id.clone();
            let event = Event::new(EventPayload::StrategySuspended(StrategySuspension {
                reason: format!("{} errors reported", suspension.error_count),
                strategy_id: suspension.strategy_id,
                error_count: suspension.error_count,
            }))
            .with_source("risk_manager")
            .routed(strategy);
            bus.publish(event, DispatchMode::Sync);
        });

        let orders = OrderManager::start(config, Arc::clone(bus), Arc::clone(&risk), session)?;

        Ok(Self {
            account,
            risk,
            orders,
            bus: Arc::clone(bus),
            error_feed: Some(error_feed),
        })
    }

    pub async fn shutdown(&mut self) {
        if let Some(id) = self.error_feed.take() {
            self.bus.unsubscribe(id);
        }
        self.risk.stop_monitor();
        self.orders.shutdown().await;
        self.account.detach();
    }
}

/// Count `strategy.error` reports against their strategy
fn follow_strategy_errors(bus: &Arc<EventBus>, risk: &Arc<RiskManager>) -> SubscriptionId {
    let weak = Arc::downgrade(risk);
    bus.subscribe(
        types::STRATEGY_ERROR,
        handler(move |event| {
            if let (Some(risk), EventPayload::StrategyError(fault)) = (weak.upgrade(), event.payload()) {
                let count = risk.record_error(&fault.strategy_id);
                debug!(
                    "[RISK] {} error #{}: {}",
                    fault.strategy_id, count, fault.message
                );
            }
            Ok(())
        }),
        DispatchMode::Sync,
    )
}
