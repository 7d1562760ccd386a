//! Event envelope and event kinds
//!
//! An [`Event`] wraps one [`EventPayload`] variant. The payload decides the
//! base event type string and the priority, so consumers can subscribe by
//! string while producers get exhaustive matching on the enum.
//!
//! A route suffix narrows an event to one consumer: a tick routed to
//! strategy `s1` has type `market.tick.s1` and reaches subscribers of both
//! `market.tick.s1` and `market.tick`.

use chrono::{DateTime, Utc};
use hermes_core::{AccountRecord, OrderIntent, OrderRecord, PositionRecord, TickData, TradeRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messages::*;

/// Event type strings
pub mod types {
    pub const TIMER: &str = "timer";
    pub const QUEUE_FULL: &str = "bus.queue_full";

    pub const MARKET_TICK: &str = "market.tick";

    pub const GATEWAY_STATE_CHANGED: &str = "gateway.state_changed";
    pub const GATEWAY_CONTRACTS_READY: &str = "gateway.contracts_ready";
    pub const GATEWAY_ERROR: &str = "gateway.error";
    pub const GATEWAY_DISCONNECTED: &str = "gateway.disconnected";
    pub const GATEWAY_RECONNECT_FAILED: &str = "gateway.reconnect_failed";
    pub const GATEWAY_SEND_ORDER: &str = "gateway.send_order";
    pub const GATEWAY_CANCEL_ORDER: &str = "gateway.cancel_order";
    pub const GATEWAY_SUBSCRIBE: &str = "gateway.subscribe";
    pub const GATEWAY_QUERY_ACCOUNT: &str = "gateway.query_account";
    pub const GATEWAY_QUERY_POSITION: &str = "gateway.query_position";
    pub const GATEWAY_ORDER: &str = "gateway.order";
    pub const GATEWAY_TRADE: &str = "gateway.trade";

    pub const POSITION_UPDATE: &str = "position.update";
    pub const ACCOUNT_UPDATE: &str = "account.update";

    pub const ORDER_INTENT: &str = "order.intent";
    pub const ORDER_SENT: &str = "order.sent";
    pub const ORDER_SEND_FAILED: &str = "order.send_failed";
    pub const ORDER_SUBMITTED: &str = "order.submitted";
    pub const ORDER_UPDATED: &str = "order.updated";
    pub const ORDER_FILLED: &str = "order.filled";
    pub const ORDER_REJECTED: &str = "order.rejected";
    pub const ORDER_CANCEL_FAILED: &str = "order.cancel_failed";
    pub const ORDER_CANCEL_REJECTED: &str = "order.cancel_rejected";
    pub const RISK_REJECTED: &str = "risk.rejected";
    pub const RISK_STRATEGY_SUSPENDED: &str = "risk.strategy_suspended";

    pub const STRATEGY_ERROR: &str = "strategy.error";

    pub const SERVICE_REGISTER: &str = "service.register";
    pub const SERVICE_UNREGISTER: &str = "service.unregister";
    pub const SERVICE_HEARTBEAT: &str = "service.heartbeat";
    pub const SERVICE_DISCOVERY: &str = "service.discovery";
    pub const SERVICE_UPDATED: &str = "service.updated";
    pub const SERVICE_FAILED: &str = "service.failed";
    pub const SERVICE_DISCOVERY_RESPONSE: &str = "service.discovery_response";

    /// Pattern matching every event (sync global handlers only)
    pub const WILDCARD: &str = "*";
}

/// Queue priority. Lower sorts first: `Critical < High < Normal < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

/// How `publish` delivers an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchMode {
    /// Run matching handlers in the caller before returning
    Sync,
    /// Enqueue for the async worker and return immediately
    Async,
}

/// One payload type per event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Timer,
    QueueFull(QueueFull),
    Custom(CustomEvent),

    Tick(TickData),

    GatewayStateChanged(StateChange),
    ContractsReady(ContractsReady),
    GatewayError(VendorFault),
    GatewayDisconnected(Disconnected),
    ReconnectFailed(ReconnectFailed),
    SendOrder(OrderDispatch),
    CancelOrder(CancelDispatch),
    Subscribe(SubscribeRequest),
    QueryAccount(QueryRequest),
    QueryPosition(QueryRequest),
    VendorOrder(OrderUpdate),
    VendorTrade(TradeRecord),

    PositionUpdate(PositionRecord),
    AccountUpdate(AccountRecord),

    OrderIntent(OrderIntent),
    OrderSent(OrderAck),
    OrderSendFailed(DispatchFailure),
    OrderSubmitted(OrderRecord),
    OrderUpdated(OrderRecord),
    OrderFilled(TradeRecord),
    OrderRejected(OrderRejection),
    CancelFailed(CancelFailure),
    CancelRejected(CancelRejection),
    RiskRejected(RiskRejection),
    StrategySuspended(StrategySuspension),

    StrategyError(StrategyFault),

    ServiceRegister(ServiceInfo),
    ServiceUnregister(ServiceName),
    ServiceHeartbeat(ServiceName),
    ServiceDiscovery(DiscoveryRequest),
    ServiceUpdated(ServiceUpdate),
    ServiceFailed(ServiceFailure),
    ServiceDiscoveryResponse(DiscoveryResponse),
}

impl EventPayload {
    /// Event type string without any route suffix
    pub fn base_type(&self) -> &str {
        match self {
            Self::Timer => types::TIMER,
            Self::QueueFull(_) => types::QUEUE_FULL,
            Self::Custom(custom) => &custom.name,
            Self::Tick(_) => types::MARKET_TICK,
            Self::GatewayStateChanged(_) => types::GATEWAY_STATE_CHANGED,
            Self::ContractsReady(_) => types::GATEWAY_CONTRACTS_READY,
            Self::GatewayError(_) => types::GATEWAY_ERROR,
            Self::GatewayDisconnected(_) => types::GATEWAY_DISCONNECTED,
            Self::ReconnectFailed(_) => types::GATEWAY_RECONNECT_FAILED,
            Self::SendOrder(_) => types::GATEWAY_SEND_ORDER,
            Self::CancelOrder(_) => types::GATEWAY_CANCEL_ORDER,
            Self::Subscribe(_) => types::GATEWAY_SUBSCRIBE,
            Self::QueryAccount(_) => types::GATEWAY_QUERY_ACCOUNT,
            Self::QueryPosition(_) => types::GATEWAY_QUERY_POSITION,
            Self::VendorOrder(_) => types::GATEWAY_ORDER,
            Self::VendorTrade(_) => types::GATEWAY_TRADE,
            Self::PositionUpdate(_) => types::POSITION_UPDATE,
            Self::AccountUpdate(_) => types::ACCOUNT_UPDATE,
            Self::OrderIntent(_) => types::ORDER_INTENT,
            Self::OrderSent(_) => types::ORDER_SENT,
            Self::OrderSendFailed(_) => types::ORDER_SEND_FAILED,
            Self::OrderSubmitted(_) => types::ORDER_SUBMITTED,
            Self::OrderUpdated(_) => types::ORDER_UPDATED,
            Self::OrderFilled(_) => types::ORDER_FILLED,
            Self::OrderRejected(_) => types::ORDER_REJECTED,
            Self::CancelFailed(_) => types::ORDER_CANCEL_FAILED,
            Self::CancelRejected(_) => types::ORDER_CANCEL_REJECTED,
            Self::RiskRejected(_) => types::RISK_REJECTED,
            Self::StrategySuspended(_) => types::RISK_STRATEGY_SUSPENDED,
            Self::StrategyError(_) => types::STRATEGY_ERROR,
            Self::ServiceRegister(_) => types::SERVICE_REGISTER,
            Self::ServiceUnregister(_) => types::SERVICE_UNREGISTER,
            Self::ServiceHeartbeat(_) => types::SERVICE_HEARTBEAT,
            Self::ServiceDiscovery(_) => types::SERVICE_DISCOVERY,
            Self::ServiceUpdated(_) => types::SERVICE_UPDATED,
            Self::ServiceFailed(_) => types::SERVICE_FAILED,
            Self::ServiceDiscoveryResponse(_) => types::SERVICE_DISCOVERY_RESPONSE,
        }
    }

    /// Priority is fixed per kind, so one event type never reorders itself
    pub fn priority(&self) -> Priority {
        match self {
            Self::GatewayDisconnected(_)
            | Self::ReconnectFailed(_)
            | Self::GatewayError(_)
            | Self::QueueFull(_) => Priority::Critical,
            Self::GatewayStateChanged(_)
            | Self::ContractsReady(_)
            | Self::SendOrder(_)
            | Self::CancelOrder(_)
            | Self::VendorOrder(_)
            | Self::VendorTrade(_)
            | Self::OrderIntent(_)
            | Self::OrderSent(_)
            | Self::OrderSendFailed(_)
            | Self::OrderSubmitted(_)
            | Self::OrderUpdated(_)
            | Self::OrderFilled(_)
            | Self::OrderRejected(_)
            | Self::CancelFailed(_)
            | Self::CancelRejected(_)
            | Self::RiskRejected(_)
            | Self::StrategySuspended(_) => Priority::High,
            Self::Timer => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// Immutable message envelope
///
/// Built with [`Event::new`] and the `with_*` / [`Event::routed`] builders;
/// once handed to the bus it is only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    route: Option<String>,
    payload: EventPayload,
    source: String,
    trace_id: Uuid,
    created_at: DateTime<Utc>,
    priority: Priority,
    /// Set on events that arrived over the distributed bus
    #[serde(skip)]
    remote: bool,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_type: payload.base_type().to_string(),
            route: None,
            priority: payload.priority(),
            payload,
            source: String::new(),
            trace_id: Uuid::new_v4(),
            created_at: Utc::now(),
            remote: false,
        }
    }

    /// Shorthand for a consumer-defined event
    pub fn custom(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(EventPayload::Custom(CustomEvent {
            name: name.into(),
            body: body.into(),
        }))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Reuse the trace id of the event that caused this one
    pub fn with_trace(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Narrow the event to one consumer: type becomes `{base}.{route}`
    pub fn routed(mut self, route: impl Into<String>) -> Self {
        let route = route.into();
        self.event_type = format!("{}.{}", self.payload.base_type(), route);
        self.route = Some(route);
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn base_type(&self) -> &str {
        self.payload.base_type()
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Returns true if the stored type and priority agree with the payload.
    /// Decoded events that fail this are rejected by the codec.
    pub(crate) fn is_consistent(&self) -> bool {
        let expected = match &self.route {
            Some(route) => format!("{}.{}", self.payload.base_type(), route),
            None => self.payload.base_type().to_string(),
        };
        self.event_type == expected && self.priority == self.payload.priority()
    }

    pub(crate) fn mark_remote(&mut self) {
        self.remote = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_event_type() {
        let event = Event::custom("X", "payload");
        assert_eq!(event.event_type(), "X");
        assert_eq!(event.priority(), Priority::Normal);
        assert!(event.route().is_none());
    }

    #[test]
    fn test_routed_event_type() {
        let event = Event::new(EventPayload::Timer).routed("s1");
        assert_eq!(event.event_type(), "timer.s1");
        assert_eq!(event.base_type(), "timer");
        assert_eq!(event.route(), Some("s1"));
        assert!(event.is_consistent());
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
        assert_eq!(Event::new(EventPayload::Timer).priority(), Priority::Low);
    }

    #[test]
    fn test_trace_propagation() {
        let cause = Event::custom("cause", "");
        let effect = Event::custom("effect", "").with_trace(cause.trace_id());
        assert_eq!(cause.trace_id(), effect.trace_id());
    }
}
