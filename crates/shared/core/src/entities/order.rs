use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Direction, Exchange, Offset, OrderStatus, OrderType};
use crate::values::{Price, Symbol, Timestamp, Volume};

/// System-assigned order identifier
pub type OrderId = String;

/// What a strategy asks for, before risk checks and id assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub strategy_id: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: Price,
    pub volume: Volume,
    /// Free-form tag carried through to updates
    pub reference: String,
}

impl OrderIntent {
    /// Limit order opening a position
    pub fn limit(
        strategy_id: impl Into<String>,
        symbol: impl Into<Symbol>,
        exchange: Exchange,
        direction: Direction,
        price: Price,
        volume: Volume,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            symbol: symbol.into(),
            exchange,
            direction,
            offset: Offset::Open,
            order_type: OrderType::Limit,
            price,
            volume,
            reference: String::new(),
        }
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }
}

/// Locally tracked order
///
/// Created after the risk gate passes, mutated only by venue callbacks,
/// archived once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub strategy_id: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: Price,
    pub volume: Volume,
    pub traded: Volume,
    pub status: OrderStatus,
    /// `{front_id}_{session_id}_{order_ref}` once the session dispatched it
    pub routing_key: Option<String>,
    pub reference: String,
    pub reject_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OrderRecord {
    /// New record in `Submitting` for an intent that passed risk
    pub fn from_intent(id: impl Into<OrderId>, intent: &OrderIntent) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            strategy_id: intent.strategy_id.clone(),
            symbol: intent.symbol.clone(),
            exchange: intent.exchange,
            direction: intent.direction,
            offset: intent.offset,
            order_type: intent.order_type,
            price: intent.price,
            volume: intent.volume,
            traded: 0,
            status: OrderStatus::Submitting,
            routing_key: None,
            reference: intent.reference.clone(),
            reject_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining(&self) -> Volume {
        self.volume.saturating_sub(self.traded)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
