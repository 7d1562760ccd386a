//! Payload types carried by bus events
//!
//! Every struct here crosses the distributed bus, so all of them must stay
//! bincode friendly: no untagged enums, no `deserialize_any` types.

use chrono::{DateTime, Utc};
use hermes_core::{
    Direction, Exchange, GatewayState, Offset, OrderId, OrderRecord, OrderStatus, OrderType, Price,
    RiskLevel, Symbol, Volume,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which bus queue an overflow happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueFull {
    pub queue: QueueKind,
    pub capacity: usize,
    /// Type of the event that was dropped
    pub dropped_type: String,
}

/// Consumer-defined event kind; the name is the event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub name: String,
    pub body: String,
}

// ============================================================================
// Gateway status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub gateway: String,
    pub old_state: GatewayState,
    pub new_state: GatewayState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractsReady {
    pub gateway: String,
    pub count: usize,
}

/// Vendor error relayed as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorFault {
    pub gateway: String,
    pub code: i32,
    pub message: String,
    /// Session state when the error arrived
    pub state: GatewayState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disconnected {
    pub gateway: String,
    pub reason_code: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectFailed {
    pub gateway: String,
    pub attempts: u32,
}

// ============================================================================
// Gateway commands
// ============================================================================

/// Request for the session to send an order to the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDispatch {
    pub gateway: String,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: Price,
    pub volume: Volume,
}

impl OrderDispatch {
    pub fn from_record(gateway: impl Into<String>, order: &OrderRecord) -> Self {
        Self {
            gateway: gateway.into(),
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            exchange: order.exchange,
            direction: order.direction,
            offset: order.offset,
            order_type: order.order_type,
            price: order.price,
            volume: order.volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelDispatch {
    pub gateway: String,
    pub order_id: OrderId,
    pub routing_key: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub gateway: String,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub gateway: String,
}

// ============================================================================
// Order flow
// ============================================================================

/// The session accepted an order and sent it to the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub routing_key: String,
}

/// The session refused or failed to send an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub order_id: OrderId,
    pub reason: String,
}

/// Venue view of an order, keyed by routing key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub gateway: String,
    pub routing_key: String,
    /// Venue-assigned id, once the exchange accepted the order
    pub sys_id: Option<String>,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Price,
    pub volume: Volume,
    /// Cumulative traded volume reported by the venue
    pub traded: Volume,
    pub status: OrderStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejection {
    pub order_id: OrderId,
    pub strategy_id: String,
    pub reason: String,
}

/// The session could not forward a cancel request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelFailure {
    pub gateway: String,
    pub order_id: OrderId,
    pub routing_key: String,
    pub reason: String,
}

/// A cancel request that will not reach the venue, routed to the order's owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRejection {
    pub order_id: OrderId,
    pub strategy_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRejection {
    pub strategy_id: String,
    pub symbol: Symbol,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

/// A strategy crossed its error threshold and is refused new orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySuspension {
    pub strategy_id: String,
    pub error_count: u32,
    pub reason: String,
}

/// Error reported by a strategy about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyFault {
    pub strategy_id: String,
    pub message: String,
}

// ============================================================================
// Service registry
// ============================================================================

/// What a service announces about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub kind: String,
    pub address: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            address: String::new(),
            capabilities: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub info: ServiceInfo,
    pub status: ServiceStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceAction {
    Registered,
    Unregistered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub action: ServiceAction,
    pub record: ServiceRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub record: ServiceRecord,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub request_id: String,
    /// Substring matched against service names; empty matches all
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub request_id: String,
    pub services: Vec<ServiceRecord>,
}
