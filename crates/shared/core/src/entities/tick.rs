use serde::{Deserialize, Serialize};

use super::Exchange;
use crate::values::{Price, Symbol, Timestamp, Volume};

/// Top-of-book market data snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub last_price: Price,
    pub volume: Volume,
    pub bid_price: Price,
    pub bid_volume: Volume,
    pub ask_price: Price,
    pub ask_volume: Volume,
    pub timestamp: Timestamp,
}
