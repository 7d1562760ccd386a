//! Order Manager
//!
//! Turns intents into venue orders and reconciles what the gateway reports
//! back. Orders are spread over shard actors by id; everything that touches
//! one order (risk check, dispatch, acks, returns, fills, cancels) runs on
//! its shard in arrival order, while different orders proceed in parallel.
//!
//! ```text
//!  place(intent) ─┐                         ┌──► risk.rejected / order.rejected
//!  order.intent ──┼─► shard[hash(id)] ──────┼──► order.submitted + gateway.send_order
//!  cancel(id) ────┘        ▲                └──► gateway.cancel_order
//!                          │
//!  order.sent ─────────────┤ bind routing key -> id
//!  order.send_failed ──────┤
//!  order.cancel_failed ────┤                ───► order.cancel_rejected.<strategy>
//!  gateway.order ──────────┤ routing key -> id
//!  gateway.trade ──────────┘                ───► order.updated.<strategy>
//!                                           ───► order.filled.<strategy>
//! ```

use crate::book::OrderBook;
use crate::config::PipelineConfig;
use crate::error::{CancelError, OrderError, PlaceError, Result};
use chrono::Utc;
use hermes_bus::messages::{
    CancelDispatch, CancelFailure, CancelRejection, DispatchFailure, OrderAck, OrderDispatch,
    OrderRejection, OrderUpdate, RiskRejection,
};
use hermes_bus::{DispatchMode, Event, EventBus, EventPayload, SubscriptionId, handler, types};
use hermes_core::{OrderId, OrderIntent, OrderRecord, OrderStatus, TradeRecord};
use hermes_gateway::SessionView;
use hermes_risk_manager::RiskManager;
use log::{debug, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

const SOURCE: &str = "order_manager";

type PlaceReply = oneshot::Sender<std::result::Result<OrderId, PlaceError>>;
type CancelReply = oneshot::Sender<std::result::Result<(), CancelError>>;

enum ShardCommand {
    Place {
        id: OrderId,
        intent: OrderIntent,
        reply: Option<PlaceReply>,
    },
    Cancel {
        id: OrderId,
        reply: CancelReply,
    },
    Sent(OrderAck),
    SendFailed(DispatchFailure),
    CancelFailed(CancelFailure),
    Update {
        id: OrderId,
        update: OrderUpdate,
    },
    Trade {
        id: OrderId,
        trade: TradeRecord,
    },
    Stop,
}

/// Shard senders, indexed by `hash(order id) % len`
#[derive(Clone)]
struct Shards(Arc<Vec<mpsc::UnboundedSender<ShardCommand>>>);

impl Shards {
    fn send(&self, id: &str, command: ShardCommand) -> bool {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.0.len() as u64) as usize;
        self.0[index].send(command).is_ok()
    }
}

// ============================================================================
// Order Manager
// ============================================================================

pub struct OrderManager {
    config: PipelineConfig,
    bus: Arc<EventBus>,
    book: Arc<OrderBook>,
    shards: Shards,
    tasks: Vec<JoinHandle<()>>,
    subscriptions: Vec<SubscriptionId>,
}

impl OrderManager {
    /// Spawn the shard actors and follow order traffic on `bus`
    pub fn start(
        config: PipelineConfig,
        bus: Arc<EventBus>,
        risk: Arc<RiskManager>,
        session: SessionView,
    ) -> Result<Self> {
        if config.shards == 0 {
            return Err(OrderError::InvalidConfig("shards must be at least 1".to_string()));
        }
        if config.gateway.is_empty() {
            return Err(OrderError::InvalidConfig("gateway name is empty".to_string()));
        }

        let book = Arc::new(OrderBook::new());
        let mut senders = Vec::with_capacity(config.shards);
        let mut tasks = Vec::with_capacity(config.shards);
        for index in 0..config.shards {
            let (tx, rx) = mpsc::unbounded_channel();
            let shard = Shard {
                index,
                gateway: config.gateway.clone(),
                bus: Arc::clone(&bus),
                risk: Arc::clone(&risk),
                session: session.clone(),
                book: Arc::clone(&book),
            };
            tasks.push(tokio::spawn(shard.run(rx)));
            senders.push(tx);
        }

        let mut manager = Self {
            config,
            bus,
            book,
            shards: Shards(Arc::new(senders)),
            tasks,
            subscriptions: Vec::new(),
        };
        manager.attach();
        info!(
            "[ORDER] Started {} shards for gateway {}",
            manager.config.shards, manager.config.gateway
        );
        Ok(manager)
    }

    fn attach(&mut self) {
        let shards = self.shards.clone();
        let id = self.bus.subscribe(
            types::ORDER_INTENT,
            handler(move |event| {
                if let EventPayload::OrderIntent(intent) = event.payload() {
                    let id = Uuid::new_v4().to_string();
                    let command = ShardCommand::Place {
                        id: id.clone(),
                        intent: intent.clone(),
                        reply: None,
                    };
                    if !shards.send(&id, command) {
                        warn!("[ORDER] Pipeline stopped, intent from {} dropped", intent.strategy_id);
                    }
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);

        let (shards, book) = (self.shards.clone(), Arc::clone(&self.book));
        let id = self.bus.subscribe(
            types::ORDER_SENT,
            handler(move |event| {
                if let EventPayload::OrderSent(ack) = event.payload()
                    && book.is_known(&ack.order_id)
                {
                    // bound before the shard sees the ack so returns can be routed at once
                    book.bind(&ack.routing_key, &ack.order_id);
                    shards.send(&ack.order_id, ShardCommand::Sent(ack.clone()));
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);

        let (shards, book) = (self.shards.clone(), Arc::clone(&self.book));
        let id = self.bus.subscribe(
            types::ORDER_SEND_FAILED,
            handler(move |event| {
                if let EventPayload::OrderSendFailed(failure) = event.payload()
                    && book.is_known(&failure.order_id)
                {
                    shards.send(&failure.order_id, ShardCommand::SendFailed(failure.clone()));
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);

        let (shards, book) = (self.shards.clone(), Arc::clone(&self.book));
        let gateway = self.config.gateway.clone();
        let id = self.bus.subscribe(
            types::ORDER_CANCEL_FAILED,
            handler(move |event| {
                if let EventPayload::CancelFailed(failure) = event.payload()
                    && failure.gateway == gateway
                    && book.is_known(&failure.order_id)
                {
                    shards.send(&failure.order_id, ShardCommand::CancelFailed(failure.clone()));
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);

        let (shards, book) = (self.shards.clone(), Arc::clone(&self.book));
        let gateway = self.config.gateway.clone();
        let id = self.bus.subscribe(
            types::GATEWAY_ORDER,
            handler(move |event| {
                let EventPayload::VendorOrder(update) = event.payload() else {
                    return Ok(());
                };
                if update.gateway != gateway {
                    return Ok(());
                }
                match book.order_for_route(&update.routing_key) {
                    Some(id) => {
                        let command = ShardCommand::Update {
                            id: id.clone(),
                            update: update.clone(),
                        };
                        shards.send(&id, command);
                    }
                    None => debug!("[ORDER] Return for untracked order {}", update.routing_key),
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);

        let (shards, book) = (self.shards.clone(), Arc::clone(&self.book));
        let id = self.bus.subscribe(
            types::GATEWAY_TRADE,
            handler(move |event| {
                let EventPayload::VendorTrade(trade) = event.payload() else {
                    return Ok(());
                };
                match book.order_for_route(&trade.routing_key) {
                    Some(id) => {
                        let command = ShardCommand::Trade {
                            id: id.clone(),
                            trade: trade.clone(),
                        };
                        shards.send(&id, command);
                    }
                    None => debug!(
                        "[ORDER] Trade {} for untracked order {}",
                        trade.trade_id, trade.routing_key
                    ),
                }
                Ok(())
            }),
            DispatchMode::Sync,
        );
        self.subscriptions.push(id);
    }

    fn detach(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Risk-check and dispatch an intent. Returns the new order id once the
    /// order is on its way to the gateway.
    pub async fn place(&self, intent: OrderIntent) -> std::result::Result<OrderId, PlaceError> {
        let id = Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        let command = ShardCommand::Place {
            id: id.clone(),
            intent,
            reply: Some(reply),
        };
        if !self.shards.send(&id, command) {
            return Err(PlaceError::Stopped);
        }
        rx.await.unwrap_or(Err(PlaceError::Stopped))
    }

    /// Ask the gateway to cancel an acknowledged, live order
    pub async fn cancel(&self, id: &str) -> std::result::Result<(), CancelError> {
        let (reply, rx) = oneshot::channel();
        let command = ShardCommand::Cancel {
            id: id.to_string(),
            reply,
        };
        if !self.shards.send(id, command) {
            return Err(CancelError::Stopped);
        }
        rx.await.unwrap_or(Err(CancelError::Stopped))
    }

    pub fn order(&self, id: &str) -> Option<OrderRecord> {
        self.book.order(id)
    }

    pub fn active_orders(&self) -> Vec<OrderRecord> {
        self.book.active_orders()
    }

    pub fn trades(&self, order_id: &str) -> Vec<TradeRecord> {
        self.book.trades(order_id)
    }

    pub fn book(&self) -> Arc<OrderBook> {
        Arc::clone(&self.book)
    }

    /// Stop following the bus and wait for the shards to drain
    pub async fn shutdown(&mut self) {
        self.detach();
        for sender in self.shards.0.iter() {
            let _ = sender.send(ShardCommand::Stop);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("[ORDER] Shard task failed: {}", e);
            }
        }
        info!("[ORDER] Stopped, {} orders still active", self.book.active_orders().len());
    }
}

impl Drop for OrderManager {
    fn drop(&mut self) {
        self.detach();
        for sender in self.shards.0.iter() {
            let _ = sender.send(ShardCommand::Stop);
        }
    }
}

// ============================================================================
// Shard actor
// ============================================================================

struct Shard {
    index: usize,
    gateway: String,
    bus: Arc<EventBus>,
    risk: Arc<RiskManager>,
    session: SessionView,
    book: Arc<OrderBook>,
}

impl Shard {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<ShardCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                ShardCommand::Place { id, intent, reply } => {
                    let result = self.place(id, intent).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                ShardCommand::Cancel { id, reply } => {
                    let _ = reply.send(self.cancel(&id));
                }
                ShardCommand::Sent(ack) => self.on_sent(ack),
                ShardCommand::SendFailed(failure) => self.on_send_failed(failure),
                ShardCommand::CancelFailed(failure) => self.on_cancel_failed(failure),
                ShardCommand::Update { id, update } => self.on_update(&id, update),
                ShardCommand::Trade { id, trade } => self.on_trade(&id, trade),
                ShardCommand::Stop => break,
            }
        }
        debug!("[ORDER] Shard {} stopped", self.index);
    }

    async fn place(
        &self,
        id: OrderId,
        intent: OrderIntent,
    ) -> std::result::Result<OrderId, PlaceError> {
        let verdict = self.risk.check(&intent).await;
        if !verdict.passed {
            let reasons = verdict.reasons();
            self.publish(
                EventPayload::RiskRejected(RiskRejection {
                    strategy_id: intent.strategy_id.clone(),
                    symbol: intent.symbol.clone(),
                    level: verdict.level,
                    reasons: reasons.clone(),
                }),
                Some(&intent.strategy_id),
            );
            return Err(PlaceError::Risk {
                level: verdict.level,
                reasons,
            });
        }
        for warning in &verdict.warnings {
            debug!("[ORDER] {} risk warning: {}", id, warning);
        }

        let mut record = OrderRecord::from_intent(id.clone(), &intent);
        let state = self.session.state();
        let refusal = if !state.is_ready() {
            Some(PlaceError::NotReady {
                gateway: self.gateway.clone(),
                state,
            })
        } else if self.session.contract(&intent.symbol).is_none() {
            Some(PlaceError::UnknownContract(intent.symbol.clone()))
        } else {
            None
        };

        if let Some(error) = refusal {
            warn!("[ORDER] {} rejected: {}", id, error);
            record.status = OrderStatus::Rejected;
            record.reject_reason = Some(error.to_string());
            record.updated_at = Utc::now();
            self.book.store(record);
            self.publish(
                EventPayload::OrderRejected(OrderRejection {
                    order_id: id,
                    strategy_id: intent.strategy_id.clone(),
                    reason: error.to_string(),
                }),
                Some(&intent.strategy_id),
            );
            return Err(error);
        }

        self.book.store(record.clone());
        info!(
            "[ORDER] {} submitted: {} {} {:?} {:?} {}@{}",
            id,
            record.strategy_id,
            record.symbol,
            record.direction,
            record.offset,
            record.volume,
            record.price
        );
        let dispatch = OrderDispatch::from_record(self.gateway.clone(), &record);
        let strategy = record.strategy_id.clone();
        self.publish(EventPayload::OrderSubmitted(record), Some(&strategy));
        self.publish(EventPayload::SendOrder(dispatch), None);
        Ok(id)
    }

    fn cancel(&self, id: &str) -> std::result::Result<(), CancelError> {
        let Some(record) = self.book.order(id) else {
            return Err(CancelError::UnknownOrder(id.to_string()));
        };
        if record.is_terminal() {
            return Err(CancelError::Terminal {
                order_id: record.id,
                status: record.status,
            });
        }
        let Some(routing_key) = record.routing_key.clone() else {
            return Err(CancelError::NotAcknowledged(record.id));
        };

        info!("[ORDER] {} cancel requested ({})", id, routing_key);
        self.publish(
            EventPayload::CancelOrder(CancelDispatch {
                gateway: self.gateway.clone(),
                order_id: record.id,
                routing_key,
                symbol: record.symbol,
                exchange: record.exchange,
            }),
            None,
        );
        Ok(())
    }

    fn on_sent(&self, ack: OrderAck) {
        let Some(mut record) = self.book.active_record(&ack.order_id) else {
            debug!("[ORDER] Ack for inactive order {}", ack.order_id);
            return;
        };
        if record.routing_key.is_none() {
            record.routing_key = Some(ack.routing_key);
            record.updated_at = Utc::now();
            self.book.store(record);
        }
    }

    fn on_send_failed(&self, failure: DispatchFailure) {
        let Some(mut record) = self.book.active_record(&failure.order_id) else {
            return;
        };
        if !record.status.can_transition_to(OrderStatus::Rejected) {
            warn!(
                "[ORDER] Send failure for {} ignored in {}",
                record.id, record.status
            );
            return;
        }
        warn!("[ORDER] {} send failed: {}", record.id, failure.reason);
        record.status = OrderStatus::Rejected;
        record.reject_reason = Some(failure.reason.clone());
        record.updated_at = Utc::now();
        self.finish_update(record, Some(failure.reason));
    }

    /// The order keeps its status; only its owner hears about the failure
    fn on_cancel_failed(&self, failure: CancelFailure) {
        let Some(record) = self.book.order(&failure.order_id) else {
            return;
        };
        warn!(
            "[ORDER] {} cancel failed: {}",
            record.id, failure.reason
        );
        let strategy = record.strategy_id.clone();
        self.publish(
            EventPayload::CancelRejected(CancelRejection {
                order_id: record.id,
                strategy_id: record.strategy_id,
                reason: failure.reason,
            }),
            Some(&strategy),
        );
    }

    fn on_update(&self, id: &str, update: OrderUpdate) {
        let Some(mut record) = self.book.active_record(id) else {
            debug!(
                "[ORDER] Return {} {} for inactive order {} ignored",
                update.routing_key, update.status, id
            );
            return;
        };
        let status = update.status;
        if status != record.status && !record.status.can_transition_to(status) {
            warn!(
                "[ORDER] {} invalid transition {} -> {} ignored",
                id, record.status, status
            );
            return;
        }

        let traded = if status == OrderStatus::AllTraded {
            record.volume
        } else {
            record
                .traded
                .max(update.traded)
                .max(self.book.filled_volume(id))
                .min(record.volume)
        };
        if status == record.status && traded == record.traded {
            debug!("[ORDER] {} duplicate return {}", id, status);
            return;
        }

        record.status = status;
        record.traded = traded;
        if record.routing_key.is_none() {
            record.routing_key = Some(update.routing_key.clone());
        }
        let rejection = if status == OrderStatus::Rejected {
            record.reject_reason = Some(update.message.clone());
            Some(update.message)
        } else {
            None
        };
        record.updated_at = Utc::now();
        debug!(
            "[ORDER] {} {} traded {}/{}",
            record.id, record.status, record.traded, record.volume
        );
        self.finish_update(record, rejection);
    }

    fn on_trade(&self, id: &str, mut trade: TradeRecord) {
        trade.order_id = Some(id.to_string());
        if !self.book.add_trade(id, trade.clone()) {
            debug!("[ORDER] Duplicate trade {} for {}", trade.trade_id, id);
            return;
        }

        if let Some(mut record) = self.book.active_record(id) {
            let traded = record
                .traded
                .max(self.book.filled_volume(id))
                .min(record.volume);
            if traded != record.traded {
                record.traded = traded;
                record.updated_at = Utc::now();
                self.book.store(record);
            }
        }

        let strategy = self.book.order(id).map(|r| r.strategy_id);
        info!(
            "[ORDER] {} filled {}@{} ({})",
            id, trade.volume, trade.price, trade.trade_id
        );
        self.publish(EventPayload::OrderFilled(trade), strategy.as_deref());
    }

    fn finish_update(&self, record: OrderRecord, rejection: Option<String>) {
        let strategy = record.strategy_id.clone();
        let order_id = record.id.clone();
        self.book.store(record.clone());
        self.publish(EventPayload::OrderUpdated(record), Some(&strategy));
        if let Some(reason) = rejection {
            self.publish(
                EventPayload::OrderRejected(OrderRejection {
                    order_id,
                    strategy_id: strategy.clone(),
                    reason,
                }),
                Some(&strategy),
            );
        }
    }

    fn publish(&self, payload: EventPayload, route: Option<&str>) {
        let mut event = Event::new(payload).with_source(SOURCE);
        if let Some(route) = route {
            event = event.routed(route);
        }
        self.bus.publish(event, DispatchMode::Sync);
    }
}
