use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, Exchange};
use crate::values::{Price, Symbol, Volume};

/// Map key for holdings: one record per (symbol, direction)
pub type PositionKey = (Symbol, Direction);

/// Holding in one direction of one contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub volume: Volume,
    /// Portion of `volume` carried over from previous sessions
    pub yd_volume: Volume,
    pub avg_price: Price,
    /// Volume locked by working close orders
    pub frozen: Volume,
    pub pnl: Decimal,
}

impl PositionRecord {
    pub fn flat(symbol: impl Into<Symbol>, exchange: Exchange, direction: Direction) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
            direction,
            volume: 0,
            yd_volume: 0,
            avg_price: Decimal::ZERO,
            frozen: 0,
            pnl: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> PositionKey {
        (self.symbol.clone(), self.direction)
    }

    pub fn is_flat(&self) -> bool {
        self.volume == 0
    }
}
