use serde::{Deserialize, Serialize};

use super::{Direction, Exchange, Offset, OrderId};
use crate::values::{Price, Symbol, Timestamp, Volume};

/// A single fill. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Venue trade id
    pub trade_id: String,
    /// Routing key of the order this fill belongs to
    pub routing_key: String,
    /// Local order id, when the fill belongs to an order placed here
    pub order_id: Option<OrderId>,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Price,
    pub volume: Volume,
    pub timestamp: Timestamp,
}
