//! Account and position tracking
//!
//! Positions are rebuilt from venue fills and overwritten by venue position
//! reports. Writers serialize on a mutex and publish a fresh snapshot;
//! readers (the risk gate, strategies) load the snapshot without locking.
//!
//! ```text
//! gateway.trade ───┐
//! position.update ─┼──► writer ──► ArcSwap<AccountSnapshot> ──► ExposureView
//! account.update ──┤
//! order.* ─────────┤ (working closes freeze lots)
//! market.tick ─────┘ (marks)
//! ```

use arc_swap::ArcSwap;
use dashmap::DashMap;
use hermes_bus::messages::QueryRequest;
use hermes_bus::{DispatchMode, Event, EventBus, EventPayload, SubscriptionId, handler, types};
use hermes_core::{
    AccountRecord, ContractRef, Direction, Offset, OrderId, OrderRecord, PositionKey,
    PositionRecord, Price, Symbol, TickData, TradeRecord, Volume,
};
use hermes_gateway::{ContractBook, SessionView};
use hermes_risk_manager::ExposureView;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Trade ids remembered for deduplication; older ids are forgotten
const TRADE_ID_MEMORY: usize = 100_000;

/// Point-in-time account state
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub positions: HashMap<PositionKey, PositionRecord>,
    /// Closed-trade pnl since start of day
    pub realized_pnl: Decimal,
    pub account: Option<AccountRecord>,
}

impl AccountSnapshot {
    /// Marked pnl of open positions
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.pnl).sum()
    }
}

/// Keeps positions and balances in step with the venue
pub struct AccountManager {
    contracts: ContractBook,
    snapshot: ArcSwap<AccountSnapshot>,
    marks: DashMap<String, Price>,
    /// Trade ids already applied
    seen: Mutex<RecentIds>,
    /// Unfilled volume of working close orders
    closing: Mutex<HashMap<OrderId, (PositionKey, Volume)>>,
    writer: Mutex<()>,
    bus: Mutex<Option<(Arc<EventBus>, Vec<SubscriptionId>)>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl AccountManager {
    pub fn new(contracts: ContractBook) -> Arc<Self> {
        Arc::new(Self {
            contracts,
            snapshot: ArcSwap::from_pointee(AccountSnapshot::default()),
            marks: DashMap::new(),
            seen: Mutex::new(RecentIds::new(TRADE_ID_MEMORY)),
            closing: Mutex::new(HashMap::new()),
            writer: Mutex::new(()),
            bus: Mutex::new(None),
            poller: Mutex::new(None),
        })
    }

    /// Follow fills, order updates, position and account reports, and ticks
    /// on `bus`
    pub fn attach(self: &Arc<Self>, bus: &Arc<EventBus>) {
        let mut ids = Vec::new();
        // the session publishes ticks async, everything else sync
        for (event_type, mode) in [
            (types::GATEWAY_TRADE, DispatchMode::Sync),
            (types::POSITION_UPDATE, DispatchMode::Sync),
            (types::ACCOUNT_UPDATE, DispatchMode::Sync),
            (types::ORDER_SUBMITTED, DispatchMode::Sync),
            (types::ORDER_UPDATED, DispatchMode::Sync),
            (types::MARKET_TICK, DispatchMode::Async),
        ] {
            let weak: Weak<Self> = Arc::downgrade(self);
            let id = bus.subscribe(
                event_type,
                handler(move |event| {
                    let Some(manager) = weak.upgrade() else {
                        return Ok(());
                    };
                    match event.payload() {
                        EventPayload::VendorTrade(trade) => {
                            manager.apply_trade(trade);
                        }
                        EventPayload::PositionUpdate(position) => {
                            manager.apply_position(position.clone())
                        }
                        EventPayload::AccountUpdate(account) => {
                            manager.apply_account(account.clone())
                        }
                        EventPayload::OrderSubmitted(order) | EventPayload::OrderUpdated(order) => {
                            manager.apply_order(order)
                        }
                        EventPayload::Tick(tick) => manager.apply_tick(tick),
                        _ => {}
                    }
                    Ok(())
                }),
                mode,
            );
            ids.push(id);
        }
        if let Some((old_bus, old_ids)) = self.bus.lock().replace((Arc::clone(bus), ids)) {
            for id in old_ids {
                old_bus.unsubscribe(id);
            }
        }
    }

    /// Ask `gateway` for fresh account and position reports every `period`.
    /// Ticks that find the session not READY are skipped.
    pub fn start_polling(
        self: &Arc<Self>,
        bus: &Arc<EventBus>,
        gateway: impl Into<String>,
        period: Duration,
        session: SessionView,
    ) {
        let gateway = gateway.into();
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("[ACCOUNT] no runtime; {} will not be polled", gateway);
            return;
        }
        let weak = Arc::downgrade(self);
        let bus = Arc::clone(bus);
        info!("[ACCOUNT] Polling {} every {:?}", gateway, period);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if weak.strong_count() == 0 {
                    break;
                }
                if !session.is_ready() {
                    debug!("[ACCOUNT] {} not ready, skipping refresh", gateway);
                    continue;
                }
                for payload in [
                    EventPayload::QueryAccount(QueryRequest {
                        gateway: gateway.clone(),
                    }),
                    EventPayload::QueryPosition(QueryRequest {
                        gateway: gateway.clone(),
                    }),
                ] {
                    bus.publish(
                        Event::new(payload).with_source("account_manager"),
                        DispatchMode::Sync,
                    );
                }
            }
        });
        if let Some(previous) = self.poller.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop following the bus and stop polling
    pub fn detach(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
        if let Some((bus, ids)) = self.bus.lock().take() {
            for id in ids {
                bus.unsubscribe(id);
            }
        }
    }

    pub fn snapshot(&self) -> Arc<AccountSnapshot> {
        self.snapshot.load_full()
    }

    pub fn position_record(&self, symbol: &str, direction: Direction) -> Option<PositionRecord> {
        self.snapshot
            .load()
            .positions
            .get(&(symbol.to_string(), direction))
            .cloned()
    }

    pub fn account(&self) -> Option<AccountRecord> {
        self.snapshot.load().account.clone()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.snapshot.load().realized_pnl
    }

    /// Apply a venue fill. Returns the pnl it realized, or `None` for a
    /// trade id seen before.
    pub fn apply_trade(&self, trade: &TradeRecord) -> Option<Decimal> {
        if !self.seen.lock().insert(&trade.trade_id) {
            debug!("[ACCOUNT] Duplicate trade {} ignored", trade.trade_id);
            return None;
        }

        let multiplier = self.multiplier(&trade.symbol);
        let mark = self.marks.get(&trade.symbol).map(|m| *m);
        let mut realized = Decimal::ZERO;

        self.update(|snapshot| {
            if trade.offset.is_close() {
                let key = (trade.symbol.clone(), trade.direction.opposite());
                let Some(position) = snapshot.positions.get_mut(&key) else {
                    warn!(
                        "[ACCOUNT] Close fill {} on {} {:?} with no position",
                        trade.trade_id, trade.symbol, key.1
                    );
                    return;
                };
                realized = close_position(position, trade, multiplier);
                refresh_pnl(position, mark, multiplier);
            } else {
                let key = (trade.symbol.clone(), trade.direction);
                let position = snapshot.positions.entry(key).or_insert_with(|| {
                    PositionRecord::flat(trade.symbol.clone(), trade.exchange, trade.direction)
                });
                open_position(position, trade.price, trade.volume);
                refresh_pnl(position, mark, multiplier);
            }
            snapshot.realized_pnl += realized;
            if let Some(account) = snapshot.account.as_mut() {
                account.balance += realized;
                account.available += realized;
            }
        });

        debug!(
            "[ACCOUNT] Fill {} {} {:?} {:?} {}@{} realized={}",
            trade.trade_id,
            trade.symbol,
            trade.direction,
            trade.offset,
            trade.volume,
            trade.price,
            realized
        );
        Some(realized)
    }

    /// Venue position report; replaces the record for its key
    pub fn apply_position(&self, position: PositionRecord) {
        self.update(|snapshot| {
            snapshot.positions.insert(position.key(), position);
        });
    }

    /// Freeze the lots a working close order would take. Terminal orders
    /// release what they still held.
    pub fn apply_order(&self, order: &OrderRecord) {
        if !order.offset.is_close() {
            return;
        }
        let key = (order.symbol.clone(), order.direction.opposite());
        let working = if order.is_terminal() {
            0
        } else {
            order.volume.saturating_sub(order.traded)
        };
        let frozen: Volume = {
            let mut closing = self.closing.lock();
            if working == 0 {
                closing.remove(&order.id);
            } else {
                closing.insert(order.id.clone(), (key.clone(), working));
            }
            closing
                .values()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .sum()
        };
        self.update(|snapshot| {
            if let Some(position) = snapshot.positions.get_mut(&key) {
                position.frozen = frozen.min(position.volume);
            }
        });
    }

    pub fn apply_account(&self, account: AccountRecord) {
        self.update(|snapshot| {
            snapshot.account = Some(account);
        });
    }

    pub fn apply_tick(&self, tick: &TickData) {
        self.marks.insert(tick.symbol.clone(), tick.last_price);

        let held = self
            .snapshot
            .load()
            .positions
            .values()
            .any(|p| p.symbol == tick.symbol && !p.is_flat());
        if !held {
            return;
        }
        let multiplier = self.multiplier(&tick.symbol);
        self.update(|snapshot| {
            for position in snapshot.positions.values_mut() {
                if position.symbol == tick.symbol {
                    refresh_pnl(position, Some(tick.last_price), multiplier);
                }
            }
        });
    }

    fn multiplier(&self, symbol: &str) -> Decimal {
        self.contracts
            .get(symbol)
            .map(|c| c.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    fn update(&self, apply: impl FnOnce(&mut AccountSnapshot)) {
        // single writer; readers never take this lock
        let _writer = self.writer.lock();
        let mut next = AccountSnapshot::clone(&self.snapshot.load());
        apply(&mut next);
        self.snapshot.store(Arc::new(next));
    }
}

impl ExposureView for AccountManager {
    fn position(&self, symbol: &str, direction: Direction) -> Volume {
        self.snapshot
            .load()
            .positions
            .get(&(symbol.to_string(), direction))
            .map(|p| p.volume)
            .unwrap_or(0)
    }

    fn daily_pnl(&self) -> Decimal {
        let snapshot = self.snapshot.load();
        snapshot.realized_pnl + snapshot.unrealized_pnl()
    }

    fn last_price(&self, symbol: &str) -> Option<Price> {
        self.marks.get(symbol).map(|m| *m)
    }

    fn contract(&self, symbol: &str) -> Option<ContractRef> {
        self.contracts.get(symbol)
    }

    /// Lots are marked at the last tick, or at their average price before one
    fn position_values(&self) -> HashMap<Symbol, Decimal> {
        let mut values = HashMap::new();
        for position in self.snapshot.load().positions.values() {
            if position.is_flat() {
                continue;
            }
            let price = self
                .marks
                .get(&position.symbol)
                .map(|m| *m)
                .unwrap_or(position.avg_price);
            let value = price * Decimal::from(position.volume) * self.multiplier(&position.symbol);
            *values.entry(position.symbol.clone()).or_insert(Decimal::ZERO) += value;
        }
        values
    }
}

impl Drop for AccountManager {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Set of ids that forgets the oldest entries past `capacity`
struct RecentIds {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// False if `id` is already remembered
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

fn open_position(position: &mut PositionRecord, price: Price, volume: Volume) {
    let held = Decimal::from(position.volume);
    let added = Decimal::from(volume);
    let total = held + added;
    if !total.is_zero() {
        position.avg_price = (held * position.avg_price + added * price) / total;
    }
    position.volume += volume;
}

fn close_position(position: &mut PositionRecord, trade: &TradeRecord, multiplier: Decimal) -> Decimal {
    let closed = trade.volume.min(position.volume);
    if closed < trade.volume {
        warn!(
            "[ACCOUNT] Fill {} closes {} but only {} held on {}",
            trade.trade_id, trade.volume, position.volume, trade.symbol
        );
    }
    let quantity = Decimal::from(closed);
    let realized = match position.direction {
        Direction::Short => (position.avg_price - trade.price) * quantity * multiplier,
        Direction::Long | Direction::Net => (trade.price - position.avg_price) * quantity * multiplier,
    };

    position.volume -= closed;
    position.yd_volume = match trade.offset {
        Offset::CloseYesterday => position.yd_volume.saturating_sub(closed),
        _ => position.yd_volume.min(position.volume),
    };
    if position.volume == 0 {
        position.avg_price = Decimal::ZERO;
    }
    realized
}

fn refresh_pnl(position: &mut PositionRecord, mark: Option<Price>, multiplier: Decimal) {
    let Some(mark) = mark else {
        return;
    };
    let quantity = Decimal::from(position.volume);
    position.pnl = match position.direction {
        Direction::Short => (position.avg_price - mark) * quantity * multiplier,
        Direction::Long | Direction::Net => (mark - position.avg_price) * quantity * multiplier,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_core::{Exchange, OrderIntent, OrderStatus};
    use rust_decimal_macros::dec;

    fn fill(id: &str, direction: Direction, offset: Offset, price: Decimal, volume: u32) -> TradeRecord {
        TradeRecord {
            trade_id: id.to_string(),
            routing_key: "1_1_1".to_string(),
            order_id: None,
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            direction,
            offset,
            price,
            volume,
            timestamp: Utc::now(),
        }
    }

    fn tick(price: Decimal) -> TickData {
        TickData {
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            last_price: price,
            volume: 0,
            bid_price: price,
            bid_volume: 1,
            ask_price: price,
            ask_volume: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_open_fills_average_price() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 2));
        account.apply_trade(&fill("t2", Direction::Long, Offset::Open, dec!(3510), 2));

        let position = account.position_record("rb2510", Direction::Long).unwrap();
        assert_eq!(position.volume, 4);
        assert_eq!(position.avg_price, dec!(3505));
        assert_eq!(ExposureView::position(account.as_ref(), "rb2510", Direction::Long), 4);
        assert_eq!(ExposureView::position(account.as_ref(), "rb2510", Direction::Short), 0);
    }

    #[test]
    fn test_close_realizes_pnl() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_account(AccountRecord::new("acc", dec!(100000)));
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 3));

        // selling to close the long
        let realized = account
            .apply_trade(&fill("t2", Direction::Short, Offset::Close, dec!(3520), 2))
            .unwrap();
        assert_eq!(realized, dec!(40));

        let position = account.position_record("rb2510", Direction::Long).unwrap();
        assert_eq!(position.volume, 1);
        assert_eq!(position.avg_price, dec!(3500));
        assert_eq!(account.realized_pnl(), dec!(40));
        assert_eq!(account.account().unwrap().balance, dec!(100040));
    }

    #[test]
    fn test_short_close_and_flat_reset() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Short, Offset::Open, dec!(3500), 1));
        let realized = account
            .apply_trade(&fill("t2", Direction::Long, Offset::CloseToday, dec!(3490), 1))
            .unwrap();
        assert_eq!(realized, dec!(10));

        let position = account.position_record("rb2510", Direction::Short).unwrap();
        assert!(position.is_flat());
        assert_eq!(position.avg_price, Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_trade_applied_once() {
        let account = AccountManager::new(ContractBook::new());
        let trade = fill("t1", Direction::Long, Offset::Open, dec!(3500), 2);
        assert!(account.apply_trade(&trade).is_some());
        assert!(account.apply_trade(&trade).is_none());
        assert_eq!(account.position_record("rb2510", Direction::Long).unwrap().volume, 2);
    }

    #[test]
    fn test_recent_ids_forget_oldest() {
        let mut ids = RecentIds::new(2);
        assert!(ids.insert("t1"));
        assert!(ids.insert("t2"));
        assert!(!ids.insert("t1"));
        assert!(ids.insert("t3"));
        assert_eq!(ids.len(), 2);
        // t1 fell out, t2 and t3 are still known
        assert!(!ids.insert("t3"));
        assert!(!ids.insert("t2"));
        assert!(ids.insert("t1"));
    }

    fn close_order(id: &str, volume: u32) -> OrderRecord {
        let intent = OrderIntent::limit("s1", "rb2510", Exchange::Shfe, Direction::Short, dec!(3520), volume)
            .with_offset(Offset::Close);
        OrderRecord::from_intent(id, &intent)
    }

    #[test]
    fn test_working_closes_freeze_position() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 5));
        let frozen = || account.position_record("rb2510", Direction::Long).unwrap().frozen;

        let mut first = close_order("o1", 3);
        account.apply_order(&first);
        assert_eq!(frozen(), 3);

        first.status = OrderStatus::PartTraded;
        first.traded = 1;
        account.apply_order(&first);
        assert_eq!(frozen(), 2);

        account.apply_order(&close_order("o2", 1));
        assert_eq!(frozen(), 3);

        first.status = OrderStatus::Cancelled;
        account.apply_order(&first);
        assert_eq!(frozen(), 1);

        // opening orders freeze nothing
        let open = OrderIntent::limit("s1", "rb2510", Exchange::Shfe, Direction::Long, dec!(3500), 4);
        account.apply_order(&OrderRecord::from_intent("o3", &open));
        assert_eq!(frozen(), 1);
        assert_eq!(account.position_record("rb2510", Direction::Short), None);
    }

    #[test]
    fn test_ticks_mark_positions() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 2));
        account.apply_tick(&tick(dec!(3450)));

        assert_eq!(account.last_price("rb2510"), Some(dec!(3450)));
        let position = account.position_record("rb2510", Direction::Long).unwrap();
        assert_eq!(position.pnl, dec!(-100));
        assert_eq!(account.daily_pnl(), dec!(-100));
    }

    #[test]
    fn test_position_values_marked() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 2));
        account.apply_trade(&fill("t2", Direction::Short, Offset::Open, dec!(3520), 1));
        assert_eq!(account.position_values()["rb2510"], dec!(10520));

        account.apply_tick(&tick(dec!(3600)));
        assert_eq!(account.position_values()["rb2510"], dec!(10800));
    }

    #[test]
    fn test_position_report_overwrites() {
        let account = AccountManager::new(ContractBook::new());
        account.apply_trade(&fill("t1", Direction::Long, Offset::Open, dec!(3500), 2));

        let mut reported = PositionRecord::flat("rb2510", Exchange::Shfe, Direction::Long);
        reported.volume = 7;
        reported.yd_volume = 5;
        reported.avg_price = dec!(3480);
        account.apply_position(reported.clone());

        assert_eq!(account.position_record("rb2510", Direction::Long), Some(reported));
    }

    #[test]
    fn test_close_yesterday_reduces_yd_volume() {
        let account = AccountManager::new(ContractBook::new());
        let mut reported = PositionRecord::flat("rb2510", Exchange::Shfe, Direction::Long);
        reported.volume = 5;
        reported.yd_volume = 3;
        reported.avg_price = dec!(3500);
        account.apply_position(reported);

        account.apply_trade(&fill("t1", Direction::Short, Offset::CloseYesterday, dec!(3500), 2));
        let position = account.position_record("rb2510", Direction::Long).unwrap();
        assert_eq!(position.volume, 3);
        assert_eq!(position.yd_volume, 1);
    }
}
