//! Read-side view of the book the gate checks against

use hermes_core::{ContractRef, Direction, Price, Symbol, Volume};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// What the risk gate needs to know about current holdings and markets.
///
/// Implementations must be cheap to call from several checks at once; the
/// account manager answers from lock-free snapshots.
pub trait ExposureView: Send + Sync {
    /// Lots held on `direction` for `symbol`
    fn position(&self, symbol: &str, direction: Direction) -> Volume;

    /// Realized plus marked pnl for the trading day
    fn daily_pnl(&self) -> Decimal;

    fn last_price(&self, symbol: &str) -> Option<Price>;

    fn contract(&self, symbol: &str) -> Option<ContractRef>;

    /// Marked notional of open lots per symbol, both directions added up
    fn position_values(&self) -> HashMap<Symbol, Decimal>;
}

/// Fixed exposure, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct ExposureSnapshot {
    positions: HashMap<(Symbol, Direction), Volume>,
    daily_pnl: Decimal,
    last_prices: HashMap<Symbol, Price>,
    contracts: HashMap<Symbol, ContractRef>,
}

impl ExposureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, symbol: &str, direction: Direction, volume: Volume) -> Self {
        self.positions.insert((symbol.to_string(), direction), volume);
        self
    }

    pub fn with_daily_pnl(mut self, pnl: Decimal) -> Self {
        self.daily_pnl = pnl;
        self
    }

    pub fn with_last_price(mut self, symbol: &str, price: Price) -> Self {
        self.last_prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_contract(mut self, contract: ContractRef) -> Self {
        self.contracts.insert(contract.symbol.clone(), contract);
        self
    }
}

impl ExposureView for ExposureSnapshot {
    fn position(&self, symbol: &str, direction: Direction) -> Volume {
        self.positions
            .get(&(symbol.to_string(), direction))
            .copied()
            .unwrap_or(0)
    }

    fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    fn last_price(&self, symbol: &str) -> Option<Price> {
        self.last_prices.get(symbol).copied()
    }

    fn contract(&self, symbol: &str) -> Option<ContractRef> {
        self.contracts.get(symbol).cloned()
    }

    /// Lots without a last price are left out
    fn position_values(&self) -> HashMap<Symbol, Decimal> {
        let mut values = HashMap::new();
        for ((symbol, _), volume) in &self.positions {
            let Some(price) = self.last_prices.get(symbol) else {
                continue;
            };
            let value = match self.contracts.get(symbol) {
                Some(contract) => contract.notional(*price, *volume),
                None => *price * Decimal::from(*volume),
            };
            *values.entry(symbol.clone()).or_insert(Decimal::ZERO) += value;
        }
        values
    }
}
