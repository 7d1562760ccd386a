//! Order records, fills and routing keys
//!
//! Each order id is written by exactly one shard actor; everything else only
//! reads. Records move from `active` to `archive` when they turn terminal
//! and are never deleted.

use dashmap::DashMap;
use hermes_core::{OrderId, OrderRecord, TradeRecord, Volume};

#[derive(Debug, Default)]
pub struct OrderBook {
    active: DashMap<OrderId, OrderRecord>,
    archive: DashMap<OrderId, OrderRecord>,
    trades: DashMap<OrderId, Vec<TradeRecord>>,
    /// `{front_id}_{session_id}_{order_ref}` -> order id
    routes: DashMap<String, OrderId>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, id: &str) -> Option<OrderRecord> {
        self.active
            .get(id)
            .or_else(|| self.archive.get(id))
            .map(|r| r.clone())
    }

    pub fn active_orders(&self) -> Vec<OrderRecord> {
        let mut orders: Vec<OrderRecord> = self.active.iter().map(|r| r.clone()).collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn archived_orders(&self) -> Vec<OrderRecord> {
        let mut orders: Vec<OrderRecord> = self.archive.iter().map(|r| r.clone()).collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Fills applied to `id`, in arrival order
    pub fn trades(&self, id: &str) -> Vec<TradeRecord> {
        self.trades.get(id).map(|t| t.clone()).unwrap_or_default()
    }

    pub fn order_for_route(&self, routing_key: &str) -> Option<OrderId> {
        self.routes.get(routing_key).map(|id| id.clone())
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.archive.contains_key(id)
    }

    pub(crate) fn active_record(&self, id: &str) -> Option<OrderRecord> {
        self.active.get(id).map(|r| r.clone())
    }

    /// Insert or replace a record, archiving it once terminal
    pub(crate) fn store(&self, record: OrderRecord) {
        if record.is_terminal() {
            self.active.remove(&record.id);
            self.archive.insert(record.id.clone(), record);
        } else {
            self.active.insert(record.id.clone(), record);
        }
    }

    pub(crate) fn bind(&self, routing_key: &str, id: &str) {
        self.routes.insert(routing_key.to_string(), id.to_string());
    }

    /// Append a fill unless its trade id was already recorded for the order
    pub(crate) fn add_trade(&self, id: &str, trade: TradeRecord) -> bool {
        let mut fills = self.trades.entry(id.to_string()).or_default();
        if fills.iter().any(|t| t.trade_id == trade.trade_id) {
            return false;
        }
        fills.push(trade);
        true
    }

    pub(crate) fn filled_volume(&self, id: &str) -> Volume {
        self.trades
            .get(id)
            .map(|fills| fills.iter().map(|t| t.volume).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_core::{Direction, Exchange, Offset, OrderIntent, OrderStatus};
    use rust_decimal_macros::dec;

    fn record(id: &str) -> OrderRecord {
        let intent = OrderIntent::limit("s1", "rb2510", Exchange::Shfe, Direction::Long, dec!(3500), 5);
        OrderRecord::from_intent(id, &intent)
    }

    fn trade(trade_id: &str, volume: u32) -> TradeRecord {
        TradeRecord {
            trade_id: trade_id.to_string(),
            routing_key: "1_1_1".to_string(),
            order_id: Some("o1".to_string()),
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            direction: Direction::Long,
            offset: Offset::Open,
            price: dec!(3500),
            volume,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_terminal_records_archived() {
        let book = OrderBook::new();
        let mut order = record("o1");
        book.store(order.clone());
        assert_eq!(book.active_orders().len(), 1);

        order.status = OrderStatus::Cancelled;
        book.store(order.clone());
        assert!(book.active_orders().is_empty());
        assert_eq!(book.archived_orders(), vec![order.clone()]);
        assert_eq!(book.order("o1"), Some(order));
        assert!(book.active_record("o1").is_none());
    }

    #[test]
    fn test_trades_deduplicated() {
        let book = OrderBook::new();
        assert!(book.add_trade("o1", trade("t1", 2)));
        assert!(!book.add_trade("o1", trade("t1", 2)));
        assert!(book.add_trade("o1", trade("t2", 1)));
        assert_eq!(book.filled_volume("o1"), 3);
        assert_eq!(book.trades("o1").len(), 2);
        assert!(book.trades("o2").is_empty());
    }

    #[test]
    fn test_routes() {
        let book = OrderBook::new();
        book.bind("1_1_1", "o1");
        assert_eq!(book.order_for_route("1_1_1"), Some("o1".to_string()));
        assert_eq!(book.order_for_route("1_1_2"), None);
    }
}
