//! Pre-trade risk gate
//!
//! Every intent goes through all checks; the checks are independent and run
//! concurrently. Their findings are merged into one [`RiskCheckResult`] whose
//! content does not depend on which check finished first.
//!
//! Strategies that report too many errors are suspended: their opening
//! orders fail until [`RiskManager::reset_errors`]. A monitor task announces
//! each suspension once and drops idle frequency windows.

use crate::config::RiskConfig;
use crate::error::Result;
use crate::exposure::ExposureView;
use crate::frequency::FrequencyWindow;
use chrono::{Local, NaiveTime};
use dashmap::DashMap;
use hermes_core::{OrderIntent, OrderType, RiskLevel};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Source of local wall-clock time for the trading hours check
pub type LocalClock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// Individual checks, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskCheck {
    TradingHours,
    OrderSize,
    OrderValue,
    DailyLoss,
    PositionLimit,
    TotalPosition,
    Concentration,
    Frequency,
    PriceSanity,
    StrategySuspended,
}

impl std::fmt::Display for RiskCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskCheck::TradingHours => "trading_hours",
            RiskCheck::OrderSize => "order_size",
            RiskCheck::OrderValue => "order_value",
            RiskCheck::DailyLoss => "daily_loss",
            RiskCheck::PositionLimit => "position_limit",
            RiskCheck::TotalPosition => "total_position",
            RiskCheck::Concentration => "concentration",
            RiskCheck::Frequency => "frequency",
            RiskCheck::PriceSanity => "price_sanity",
            RiskCheck::StrategySuspended => "strategy_suspended",
        };
        f.write_str(s)
    }
}

/// A failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskViolation {
    pub check: RiskCheck,
    pub level: RiskLevel,
    pub reason: String,
}

impl RiskViolation {
    fn new(check: RiskCheck, level: RiskLevel, reason: String) -> Self {
        Self {
            check,
            level,
            reason,
        }
    }
}

/// Verdict on one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskCheckResult {
    pub passed: bool,
    /// Worst level among the violations; `Low` when passed
    pub level: RiskLevel,
    /// Sorted by check, then reason
    pub violations: Vec<RiskViolation>,
    /// Findings that did not block the order
    pub warnings: Vec<String>,
}

impl RiskCheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            level: RiskLevel::Low,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Human readable reasons, in violation order
    pub fn reasons(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.reason.clone()).collect()
    }

    pub fn violated(&self, check: RiskCheck) -> bool {
        self.violations.iter().any(|v| v.check == check)
    }

    /// Merge per-check findings. The result is the same for any ordering of
    /// `outcomes`.
    pub fn aggregate(outcomes: impl IntoIterator<Item = CheckOutcome>) -> Self {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        for outcome in outcomes {
            violations.extend(outcome.violations);
            warnings.extend(outcome.warnings);
        }

        violations.sort_by(|a, b| {
            a.check
                .cmp(&b.check)
                .then_with(|| a.level.cmp(&b.level))
                .then_with(|| a.reason.cmp(&b.reason))
        });
        warnings.sort();

        let level = violations
            .iter()
            .map(|v| v.level)
            .max()
            .unwrap_or_default();

        Self {
            passed: violations.is_empty(),
            level,
            violations,
            warnings,
        }
    }
}

/// Findings of a single check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub violations: Vec<RiskViolation>,
    pub warnings: Vec<String>,
}

impl CheckOutcome {
    fn clear() -> Self {
        Self::default()
    }

    fn violation(check: RiskCheck, level: RiskLevel, reason: String) -> Self {
        Self {
            violations: vec![RiskViolation::new(check, level, reason)],
            warnings: Vec::new(),
        }
    }

    fn warning(reason: String) -> Self {
        Self {
            violations: Vec::new(),
            warnings: vec![reason],
        }
    }
}

/// A strategy that crossed the error threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    pub strategy_id: String,
    pub error_count: u32,
}

#[derive(Debug, Default)]
struct ErrorTally {
    count: u32,
    announced: bool,
}

// ============================================================================
// Risk Manager
// ============================================================================

/// Gate between strategy intents and the order manager.
///
/// Keeps per-strategy frequency windows and error counts. Holdings, pnl and
/// market prices are read through the [`ExposureView`].
pub struct RiskManager {
    config: RiskConfig,
    exposure: Arc<dyn ExposureView>,
    windows: DashMap<String, Arc<FrequencyWindow>>,
    errors: DashMap<String, ErrorTally>,
    clock: LocalClock,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, exposure: Arc<dyn ExposureView>) -> Result<Self> {
        config.validate()?;
        if !config.enabled {
            warn!("[RISK] Pre-trade checks disabled, every intent passes");
        } else {
            info!(
                "[RISK] Limits: size={} daily_loss={} position={} total={} concentration={} freq={}/s deviation={} value={} windows={} suspend_after={}",
                config.max_order_size,
                config.max_daily_loss,
                config.max_position,
                config.max_total_position,
                config.max_concentration,
                config.max_orders_per_second,
                config.max_price_deviation,
                config.max_order_value,
                config.trading_hours.len(),
                config.strategy_suspend_threshold,
            );
        }
        Ok(Self {
            config,
            exposure,
            windows: DashMap::new(),
            errors: DashMap::new(),
            clock: Arc::new(|| Local::now().time()),
            monitor: Mutex::new(None),
        })
    }

    /// Replace the wall clock used by the trading hours check
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Orders admitted for `strategy_id` within the last second
    pub fn orders_in_window(&self, strategy_id: &str) -> usize {
        self.windows
            .get(strategy_id)
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Strategies with a live frequency window
    pub fn tracked_strategies(&self) -> usize {
        self.windows.len()
    }

    /// Count an error reported by `strategy_id`; returns its new total
    pub fn record_error(&self, strategy_id: &str) -> u32 {
        let mut tally = self.errors.entry(strategy_id.to_string()).or_default();
        tally.count = tally.count.saturating_add(1);
        let count = tally.count;
        drop(tally);
        if self.is_over_threshold(count) && !self.is_over_threshold(count - 1) {
            error!(
                "[RISK] Strategy {} reached {} errors, opening orders refused",
                strategy_id, count
            );
        }
        count
    }

    pub fn error_count(&self, strategy_id: &str) -> u32 {
        self.errors.get(strategy_id).map(|t| t.count).unwrap_or(0)
    }

    pub fn is_suspended(&self, strategy_id: &str) -> bool {
        self.is_over_threshold(self.error_count(strategy_id))
    }

    /// Clear a strategy's error count, lifting any suspension
    pub fn reset_errors(&self, strategy_id: &str) {
        if self.errors.remove(strategy_id).is_some() {
            info!("[RISK] Error count of {} reset", strategy_id);
        }
    }

    fn is_over_threshold(&self, count: u32) -> bool {
        self.config.strategy_suspend_threshold > 0 && count > self.config.strategy_suspend_threshold
    }

    /// One monitor pass: forget idle frequency windows and return the
    /// suspensions not announced before
    pub fn sweep(&self) -> Vec<Suspension> {
        let now = Instant::now();
        // a window some check still holds is never dropped
        self.windows
            .retain(|_, window| Arc::strong_count(window) > 1 || window.expire(now) > 0);

        let mut fresh = Vec::new();
        for mut entry in self.errors.iter_mut() {
            if entry.announced || !self.is_over_threshold(entry.count) {
                continue;
            }
            entry.announced = true;
            fresh.push(Suspension {
                strategy_id: entry.key().clone(),
                error_count: entry.count,
            });
        }
        fresh.sort_by(|a, b| a.strategy_id.cmp(&b.strategy_id));
        fresh
    }

    /// Run [`RiskManager::sweep`] every `monitor_interval_ms`, handing each
    /// new suspension to `notify`. Replaces a running monitor.
    pub fn start_monitor(self: &Arc<Self>, notify: impl Fn(Suspension) + Send + Sync + 'static) {
        let Some(period) = self.config.monitor_interval() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("[RISK] no runtime; monitor not started");
            return;
        }
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                for suspension in manager.sweep() {
                    warn!(
                        "[RISK] Strategy {} suspended after {} errors",
                        suspension.strategy_id, suspension.error_count
                    );
                    notify(suspension);
                }
            }
        });
        debug!("[RISK] Monitor running every {:?}", period);
        if let Some(previous) = self.monitor.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn stop_monitor(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.abort();
        }
    }

    /// Run every check against `intent`.
    ///
    /// Only the frequency check has a side effect: an intent within the rate
    /// is recorded in its strategy's window even if another check fails.
    pub async fn check(&self, intent: &OrderIntent) -> RiskCheckResult {
        if !self.config.enabled {
            return RiskCheckResult::pass();
        }

        let (hours, size, value, loss, position, exposure, frequency, price, errors) = tokio::join!(
            self.check_trading_hours(),
            self.check_order_size(intent),
            self.check_order_value(intent),
            self.check_daily_loss(intent),
            self.check_position_limit(intent),
            self.check_exposure(intent),
            self.check_frequency(intent),
            self.check_price(intent),
            self.check_strategy_errors(intent),
        );

        let result = RiskCheckResult::aggregate([
            hours, size, value, loss, position, exposure, frequency, price, errors,
        ]);

        if result.passed {
            debug!(
                "[RISK] {} {} {}x{} passed",
                intent.strategy_id, intent.symbol, intent.volume, intent.price
            );
        } else {
            warn!(
                "[RISK REJECTED] {} {} {}x{} level={} reasons={:?}",
                intent.strategy_id,
                intent.symbol,
                intent.volume,
                intent.price,
                result.level,
                result.reasons()
            );
        }
        result
    }

    async fn check_trading_hours(&self) -> CheckOutcome {
        if self.config.trading_hours.is_empty() {
            return CheckOutcome::clear();
        }
        let now = (self.clock)();
        if self.config.trading_hours.iter().any(|w| w.contains(now)) {
            CheckOutcome::clear()
        } else {
            CheckOutcome::violation(
                RiskCheck::TradingHours,
                RiskLevel::Critical,
                format!("{} is outside trading hours", now.format("%H:%M")),
            )
        }
    }

    async fn check_order_size(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.volume == 0 {
            return CheckOutcome::violation(
                RiskCheck::OrderSize,
                RiskLevel::High,
                "order volume is zero".to_string(),
            );
        }
        if intent.volume > self.config.max_order_size {
            return CheckOutcome::violation(
                RiskCheck::OrderSize,
                RiskLevel::High,
                format!(
                    "order size {} exceeds limit {}",
                    intent.volume, self.config.max_order_size
                ),
            );
        }
        CheckOutcome::clear()
    }

    /// Notional of `intent`; market orders are valued at the last price
    fn order_value(&self, intent: &OrderIntent) -> Option<Decimal> {
        let price = match intent.order_type {
            OrderType::Market => self.exposure.last_price(&intent.symbol)?,
            _ => intent.price,
        };
        Some(match self.exposure.contract(&intent.symbol) {
            Some(contract) => contract.notional(price, intent.volume),
            None => price * Decimal::from(intent.volume),
        })
    }

    async fn check_order_value(&self, intent: &OrderIntent) -> CheckOutcome {
        let Some(value) = self.order_value(intent) else {
            return CheckOutcome::clear();
        };
        if value > self.config.max_order_value {
            return CheckOutcome::violation(
                RiskCheck::OrderValue,
                RiskLevel::High,
                format!(
                    "order value {} exceeds limit {}",
                    value, self.config.max_order_value
                ),
            );
        }
        CheckOutcome::clear()
    }

    async fn check_daily_loss(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.offset.is_close() {
            return CheckOutcome::clear();
        }
        let pnl = self.exposure.daily_pnl();
        if -pnl >= self.config.max_daily_loss {
            return CheckOutcome::violation(
                RiskCheck::DailyLoss,
                RiskLevel::Critical,
                format!(
                    "daily loss {} reached limit {}",
                    -pnl, self.config.max_daily_loss
                ),
            );
        }
        CheckOutcome::clear()
    }

    async fn check_position_limit(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.offset.is_close() {
            return CheckOutcome::clear();
        }
        let held = self.exposure.position(&intent.symbol, intent.direction);
        let projected = held.saturating_add(intent.volume);
        if projected > self.config.max_position {
            return CheckOutcome::violation(
                RiskCheck::PositionLimit,
                RiskLevel::High,
                format!(
                    "position {} + {} on {} exceeds limit {}",
                    held, intent.volume, intent.symbol, self.config.max_position
                ),
            );
        }
        CheckOutcome::clear()
    }

    /// Total book notional and the symbol's share of the total limit
    async fn check_exposure(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.offset.is_close() {
            return CheckOutcome::clear();
        }
        let Some(value) = self.order_value(intent) else {
            return CheckOutcome::clear();
        };
        let values = self.exposure.position_values();

        let mut outcome = CheckOutcome::clear();
        let total = values.values().copied().sum::<Decimal>() + value;
        if total > self.config.max_total_position {
            outcome.violations.push(RiskViolation::new(
                RiskCheck::TotalPosition,
                RiskLevel::High,
                format!(
                    "total position {} exceeds limit {}",
                    total, self.config.max_total_position
                ),
            ));
        }

        let held = values.get(&intent.symbol).copied().unwrap_or(Decimal::ZERO);
        let limit = self.config.symbol_value_limit();
        if held + value > limit {
            outcome.violations.push(RiskViolation::new(
                RiskCheck::Concentration,
                RiskLevel::Medium,
                format!(
                    "{} would reach {}, above {} of the total limit",
                    intent.symbol,
                    held + value,
                    self.config.max_concentration
                ),
            ));
        }
        outcome
    }

    async fn check_strategy_errors(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.offset.is_close() || !self.is_suspended(&intent.strategy_id) {
            return CheckOutcome::clear();
        }
        CheckOutcome::violation(
            RiskCheck::StrategySuspended,
            RiskLevel::Critical,
            format!(
                "strategy {} suspended after {} errors",
                intent.strategy_id,
                self.error_count(&intent.strategy_id)
            ),
        )
    }

    async fn check_frequency(&self, intent: &OrderIntent) -> CheckOutcome {
        let window = self
            .windows
            .entry(intent.strategy_id.clone())
            .or_insert_with(|| Arc::new(FrequencyWindow::new(self.config.max_orders_per_second)))
            .clone();

        match window.try_admit(Instant::now()) {
            Ok(()) => CheckOutcome::clear(),
            Err(count) => CheckOutcome::violation(
                RiskCheck::Frequency,
                RiskLevel::High,
                format!(
                    "strategy {} sent {} orders in the last second, limit {}",
                    intent.strategy_id, count, self.config.max_orders_per_second
                ),
            ),
        }
    }

    async fn check_price(&self, intent: &OrderIntent) -> CheckOutcome {
        if intent.order_type == OrderType::Market {
            return CheckOutcome::clear();
        }

        let mut outcome = CheckOutcome::clear();
        if intent.price <= Decimal::ZERO {
            outcome.violations.push(RiskViolation::new(
                RiskCheck::PriceSanity,
                RiskLevel::Critical,
                format!("price {} is not positive", intent.price),
            ));
            return outcome;
        }

        if let Some(contract) = self.exposure.contract(&intent.symbol)
            && !contract.is_tick_aligned(intent.price)
        {
            outcome.violations.push(RiskViolation::new(
                RiskCheck::PriceSanity,
                RiskLevel::High,
                format!(
                    "price {} is not a multiple of tick {}",
                    intent.price, contract.tick_size
                ),
            ));
        }

        match self.exposure.last_price(&intent.symbol) {
            Some(last) if last > Decimal::ZERO => {
                let deviation = (intent.price - last).abs() / last;
                if deviation > self.config.max_price_deviation {
                    outcome.violations.push(RiskViolation::new(
                        RiskCheck::PriceSanity,
                        RiskLevel::High,
                        format!(
                            "price {} deviates {:.4} from last {}, limit {}",
                            intent.price, deviation, last, self.config.max_price_deviation
                        ),
                    ));
                }
            }
            _ => {
                return CheckOutcome {
                    warnings: vec![format!(
                        "no last price for {}, deviation not checked",
                        intent.symbol
                    )],
                    ..outcome
                };
            }
        }
        outcome
    }
}

impl std::fmt::Debug for RiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskManager")
            .field("config", &self.config)
            .field("strategies", &self.windows.len())
            .field("erroring", &self.errors.len())
            .finish()
    }
}

impl Drop for RiskManager {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingWindow;
    use crate::exposure::ExposureSnapshot;
    use hermes_core::{ContractRef, Direction, Exchange, Offset, ProductKind};
    use rust_decimal_macros::dec;

    fn rebar() -> ContractRef {
        ContractRef {
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            name: "rebar 2510".to_string(),
            product: ProductKind::Futures,
            multiplier: dec!(10),
            tick_size: dec!(1),
            min_volume: 1,
        }
    }

    fn exposure() -> ExposureSnapshot {
        ExposureSnapshot::new()
            .with_contract(rebar())
            .with_last_price("rb2510", dec!(3500))
    }

    fn manager(config: RiskConfig, exposure: ExposureSnapshot) -> RiskManager {
        RiskManager::new(config, Arc::new(exposure)).unwrap()
    }

    fn intent(volume: u32, price: Decimal) -> OrderIntent {
        OrderIntent::limit("s1", "rb2510", Exchange::Shfe, Direction::Long, price, volume)
    }

    #[tokio::test]
    async fn test_clean_intent_passes() {
        let risk = manager(RiskConfig::default(), exposure());
        let result = risk.check(&intent(5, dec!(3500))).await;
        assert!(result.passed);
        assert_eq!(result.level, RiskLevel::Low);
        assert!(result.violations.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_order_size_rejected() {
        let risk = manager(RiskConfig::default(), exposure());
        let result = risk.check(&intent(150, dec!(3500))).await;
        assert!(!result.passed);
        assert_eq!(result.level, RiskLevel::High);
        assert!(result.violated(RiskCheck::OrderSize));
        assert_eq!(result.reasons(), vec!["order size 150 exceeds limit 100"]);
    }

    #[tokio::test]
    async fn test_disabled_passes_everything() {
        let config = RiskConfig {
            enabled: false,
            ..Default::default()
        };
        let risk = manager(config, ExposureSnapshot::new().with_daily_pnl(dec!(-1000000000)));
        let result = risk.check(&intent(100_000, dec!(-1))).await;
        assert_eq!(result, RiskCheckResult::pass());
        assert_eq!(risk.orders_in_window("s1"), 0);
    }

    #[tokio::test]
    async fn test_daily_loss_blocks_opening_only() {
        let risk = manager(
            RiskConfig::default(),
            exposure().with_daily_pnl(dec!(-50000)),
        );
        let open = risk.check(&intent(1, dec!(3500))).await;
        assert!(open.violated(RiskCheck::DailyLoss));
        assert_eq!(open.level, RiskLevel::Critical);

        let close = risk
            .check(&intent(1, dec!(3500)).with_offset(Offset::Close))
            .await;
        assert!(close.passed);
    }

    #[tokio::test]
    async fn test_position_limit_counts_same_direction() {
        let config = RiskConfig {
            max_position: 10,
            max_concentration: Decimal::ONE,
            ..Default::default()
        };
        let risk = manager(
            config,
            exposure()
                .with_position("rb2510", Direction::Long, 8)
                .with_position("rb2510", Direction::Short, 50),
        );
        assert!(risk.check(&intent(2, dec!(3500))).await.passed);

        let result = risk.check(&intent(3, dec!(3500))).await;
        assert!(result.violated(RiskCheck::PositionLimit));
        assert_eq!(
            result.reasons(),
            vec!["position 8 + 3 on rb2510 exceeds limit 10"]
        );
    }

    #[tokio::test]
    async fn test_price_sanity() {
        let risk = manager(RiskConfig::default(), exposure());

        let result = risk.check(&intent(1, dec!(0))).await;
        assert!(result.violated(RiskCheck::PriceSanity));
        assert_eq!(result.level, RiskLevel::Critical);

        let result = risk.check(&intent(1, dec!(3500.5))).await;
        assert_eq!(result.violations.len(), 1);
        assert!(result.reasons()[0].contains("tick"));

        // 3700 is 5.7% away from 3500
        let result = risk.check(&intent(1, dec!(3700))).await;
        assert!(result.violated(RiskCheck::PriceSanity));
        assert!(risk.check(&intent(1, dec!(3675))).await.passed);
    }

    #[tokio::test]
    async fn test_missing_last_price_warns() {
        let risk = manager(
            RiskConfig::default(),
            ExposureSnapshot::new().with_contract(rebar()),
        );
        let result = risk.check(&intent(1, dec!(3500))).await;
        assert!(result.passed);
        assert_eq!(
            result.warnings,
            vec!["no last price for rb2510, deviation not checked"]
        );
    }

    #[tokio::test]
    async fn test_order_value_uses_multiplier() {
        let config = RiskConfig {
            max_order_value: dec!(1_000_000),
            ..Default::default()
        };
        let risk = manager(config, exposure());
        // 3500 * 28 * 10 = 980000
        assert!(risk.check(&intent(28, dec!(3500))).await.passed);
        // 3500 * 29 * 10 = 1015000
        let result = risk.check(&intent(29, dec!(3500))).await;
        assert!(result.violated(RiskCheck::OrderValue));
    }

    #[tokio::test]
    async fn test_trading_hours() {
        let window = TradingWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        );
        let config = RiskConfig {
            trading_hours: vec![window],
            ..Default::default()
        };

        let open = manager(config.clone(), exposure())
            .with_clock(|| NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(open.check(&intent(1, dec!(3500))).await.passed);

        let closed = manager(config, exposure())
            .with_clock(|| NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let result = closed.check(&intent(1, dec!(3500))).await;
        assert!(result.violated(RiskCheck::TradingHours));
        assert_eq!(result.reasons(), vec!["12:00 is outside trading hours"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequency_window_per_strategy() {
        let config = RiskConfig {
            max_orders_per_second: 3,
            ..Default::default()
        };
        let risk = manager(config, exposure());

        for _ in 0..3 {
            assert!(risk.check(&intent(1, dec!(3500))).await.passed);
        }
        let result = risk.check(&intent(1, dec!(3500))).await;
        assert!(result.violated(RiskCheck::Frequency));

        let mut other = intent(1, dec!(3500));
        other.strategy_id = "s2".to_string();
        assert!(risk.check(&other).await.passed);

        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        assert!(risk.check(&intent(1, dec!(3500))).await.passed);
        assert_eq!(risk.orders_in_window("s1"), 1);
    }

    #[tokio::test]
    async fn test_total_position_limit() {
        let config = RiskConfig {
            max_concentration: Decimal::ONE,
            ..Default::default()
        };
        // 130 lots marked at 3500 x 10 = 4550000
        let risk = manager(config, exposure().with_position("rb2510", Direction::Long, 130));

        // + 20 x 3500 x 10 = 700000
        let result = risk.check(&intent(20, dec!(3500))).await;
        assert!(!result.passed);
        assert_eq!(result.level, RiskLevel::High);
        assert!(result.violated(RiskCheck::TotalPosition));
        assert_eq!(
            result.reasons()[0],
            "total position 5250000 exceeds limit 5000000"
        );

        assert!(risk.check(&intent(10, dec!(3500))).await.passed);
        let close = intent(20, dec!(3500)).with_offset(Offset::Close);
        assert!(risk.check(&close).await.passed);
    }

    #[tokio::test]
    async fn test_concentration_limit() {
        // 40 lots = 1400000 of the 1500000 one symbol may take
        let risk = manager(
            RiskConfig::default(),
            exposure().with_position("rb2510", Direction::Long, 40),
        );
        assert!(risk.check(&intent(2, dec!(3500))).await.passed);

        let result = risk.check(&intent(5, dec!(3500))).await;
        assert!(result.violated(RiskCheck::Concentration));
        assert!(!result.violated(RiskCheck::TotalPosition));
        assert_eq!(result.level, RiskLevel::Medium);
        assert!(result.reasons()[0].starts_with("rb2510 would reach 1575000"));
    }

    #[tokio::test]
    async fn test_strategy_suspended_past_threshold() {
        let config = RiskConfig {
            strategy_suspend_threshold: 3,
            ..Default::default()
        };
        let risk = manager(config, exposure());
        for expected in 1..=3 {
            assert_eq!(risk.record_error("s1"), expected);
        }
        assert!(!risk.is_suspended("s1"));
        assert!(risk.check(&intent(1, dec!(3500))).await.passed);

        assert_eq!(risk.record_error("s1"), 4);
        assert!(risk.is_suspended("s1"));
        let result = risk.check(&intent(1, dec!(3500))).await;
        assert!(result.violated(RiskCheck::StrategySuspended));
        assert_eq!(result.level, RiskLevel::Critical);
        assert_eq!(result.reasons(), vec!["strategy s1 suspended after 4 errors"]);

        // closing stays possible, other strategies are unaffected
        let close = intent(1, dec!(3500)).with_offset(Offset::Close);
        assert!(risk.check(&close).await.passed);
        let mut other = intent(1, dec!(3500));
        other.strategy_id = "s2".to_string();
        assert!(risk.check(&other).await.passed);

        risk.reset_errors("s1");
        assert_eq!(risk.error_count("s1"), 0);
        assert!(risk.check(&intent(1, dec!(3500))).await.passed);
    }

    #[tokio::test]
    async fn test_zero_threshold_never_suspends() {
        let config = RiskConfig {
            strategy_suspend_threshold: 0,
            ..Default::default()
        };
        let risk = manager(config, exposure());
        for _ in 0..500 {
            risk.record_error("s1");
        }
        assert!(!risk.is_suspended("s1"));
        assert!(risk.sweep().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_announces_each_suspension_once() {
        let config = RiskConfig {
            strategy_suspend_threshold: 1,
            monitor_interval_ms: 1000,
            ..Default::default()
        };
        let risk = Arc::new(manager(config, exposure()));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        risk.start_monitor(move |suspension| sink.lock().push(suspension));

        risk.record_error("s1");
        risk.record_error("s1");
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(
            *notices.lock(),
            vec![Suspension {
                strategy_id: "s1".to_string(),
                error_count: 2
            }]
        );

        risk.record_error("s1");
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(notices.lock().len(), 1);

        risk.stop_monitor();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_drops_idle_windows() {
        let config = RiskConfig {
            monitor_interval_ms: 2000,
            ..Default::default()
        };
        let risk = Arc::new(manager(config, exposure()));
        risk.start_monitor(|_| {});

        assert!(risk.check(&intent(1, dec!(3500))).await.passed);
        assert_eq!(risk.tracked_strategies(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
        assert_eq!(risk.tracked_strategies(), 0);
        assert_eq!(risk.orders_in_window("s1"), 0);
        risk.stop_monitor();
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let outcomes = vec![
            CheckOutcome::violation(RiskCheck::PriceSanity, RiskLevel::High, "p".into()),
            CheckOutcome::warning("w2".into()),
            CheckOutcome::violation(RiskCheck::OrderSize, RiskLevel::High, "s".into()),
            CheckOutcome::clear(),
            CheckOutcome::violation(RiskCheck::DailyLoss, RiskLevel::Critical, "d".into()),
            CheckOutcome::warning("w1".into()),
        ];
        let expected = RiskCheckResult::aggregate(outcomes.clone());
        assert!(!expected.passed);
        assert_eq!(expected.level, RiskLevel::Critical);
        assert_eq!(expected.reasons(), vec!["s", "d", "p"]);
        assert_eq!(expected.warnings, vec!["w1", "w2"]);

        // every rotation and its reverse
        for shift in 0..outcomes.len() {
            let mut rotated = outcomes.clone();
            rotated.rotate_left(shift);
            assert_eq!(RiskCheckResult::aggregate(rotated.clone()), expected);
            rotated.reverse();
            assert_eq!(RiskCheckResult::aggregate(rotated), expected);
        }
    }
}
