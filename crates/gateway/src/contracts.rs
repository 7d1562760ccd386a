//! Contract table
//!
//! Written only by the session actor (once per login), read from anywhere
//! through lock-free snapshots.

use arc_swap::ArcSwap;
use hermes_core::{ContractRef, Symbol};
use std::collections::HashMap;
use std::sync::Arc;

pub type ContractMap = HashMap<Symbol, ContractRef>;

#[derive(Clone)]
pub struct ContractBook {
    table: Arc<ArcSwap<ContractMap>>,
}

impl ContractBook {
    pub fn new() -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(HashMap::new())),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<ContractRef> {
        self.table.load().get(symbol).cloned()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.table.load().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Consistent view of the whole table
    pub fn snapshot(&self) -> Arc<ContractMap> {
        self.table.load_full()
    }

    pub(crate) fn replace(&self, contracts: ContractMap) {
        self.table.store(Arc::new(contracts));
    }

    pub(crate) fn clear(&self) {
        self.replace(HashMap::new());
    }
}

impl Default for ContractBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContractBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBook")
            .field("contracts", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{Exchange, ProductKind};
    use rust_decimal_macros::dec;

    fn contract(symbol: &str) -> ContractRef {
        ContractRef {
            symbol: symbol.to_string(),
            exchange: Exchange::Shfe,
            name: symbol.to_string(),
            product: ProductKind::Futures,
            multiplier: dec!(10),
            tick_size: dec!(1),
            min_volume: 1,
        }
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let book = ContractBook::new();
        let reader = book.clone();
        book.replace(HashMap::from([("rb2510".to_string(), contract("rb2510"))]));

        let before = reader.snapshot();
        book.clear();

        assert!(before.contains_key("rb2510"));
        assert!(!reader.contains("rb2510"));
        assert!(reader.is_empty());
    }
}
