//! Risk limits
//!
//! Loaded from the `risk` section of the engine config. Every field has a
//! default, so `{}` is a valid (and permissive enough) configuration.

use crate::error::{Result, RiskError};
use chrono::NaiveTime;
use hermes_core::Volume;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Limits applied by [`crate::RiskManager`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Master switch; a disabled gate passes every intent
    pub enabled: bool,
    /// Lots per order
    pub max_order_size: Volume,
    /// Realized loss for the day at which opening is refused
    pub max_daily_loss: Decimal,
    /// Lots held in one direction of one symbol, including the new order
    pub max_position: Volume,
    /// Orders per strategy within any one second
    pub max_orders_per_second: usize,
    /// Allowed |price - last| / last
    pub max_price_deviation: Decimal,
    /// Price x volume x multiplier per order
    pub max_order_value: Decimal,
    /// Local-time windows orders may be sent in. Empty means unrestricted.
    pub trading_hours: Vec<TradingWindow>,
    /// Marked notional of all open lots plus the new order
    pub max_total_position: Decimal,
    /// Largest share of `max_total_position` one symbol may take
    pub max_concentration: Decimal,
    /// Errors a strategy may report before its opening orders are refused; 0 disables
    pub strategy_suspend_threshold: u32,
    /// Housekeeping period of the monitor task; 0 disables
    pub monitor_interval_ms: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_order_size: 100,
            max_daily_loss: Decimal::from(50_000),
            max_position: 1000,
            max_orders_per_second: 10,
            max_price_deviation: Decimal::new(5, 2),
            max_order_value: Decimal::from(1_000_000),
            trading_hours: Vec::new(),
            max_total_position: Decimal::from(5_000_000),
            max_concentration: Decimal::new(3, 1),
            strategy_suspend_threshold: 100,
            monitor_interval_ms: 10_000,
        }
    }
}

impl RiskConfig {
    pub fn monitor_interval(&self) -> Option<Duration> {
        (self.monitor_interval_ms > 0).then(|| Duration::from_millis(self.monitor_interval_ms))
    }

    /// Notional one symbol may reach
    pub fn symbol_value_limit(&self) -> Decimal {
        self.max_total_position * self.max_concentration
    }

    /// Reject limits that would make every check meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_order_size == 0 {
            return Err(RiskError::InvalidLimit {
                field: "max_order_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_daily_loss.is_sign_negative() {
            return Err(RiskError::InvalidLimit {
                field: "max_daily_loss",
                reason: format!("{} is negative", self.max_daily_loss),
            });
        }
        if self.max_price_deviation.is_sign_negative() {
            return Err(RiskError::InvalidLimit {
                field: "max_price_deviation",
                reason: format!("{} is negative", self.max_price_deviation),
            });
        }
        if self.max_order_value <= Decimal::ZERO {
            return Err(RiskError::InvalidLimit {
                field: "max_order_value",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_total_position <= Decimal::ZERO {
            return Err(RiskError::InvalidLimit {
                field: "max_total_position",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_concentration <= Decimal::ZERO || self.max_concentration > Decimal::ONE {
            return Err(RiskError::InvalidLimit {
                field: "max_concentration",
                reason: format!("{} is outside (0, 1]", self.max_concentration),
            });
        }
        for window in &self.trading_hours {
            if window.start == window.end {
                return Err(RiskError::InvalidWindow(window.to_string()));
            }
        }
        Ok(())
    }
}

/// One trading session, `start..=end` in local wall-clock time.
///
/// A window whose end is before its start runs through midnight
/// (night sessions such as 21:00 to 02:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }

    /// Day and night sessions of the domestic futures exchanges
    pub fn futures_sessions() -> Vec<TradingWindow> {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
        vec![
            TradingWindow::new(at(9, 0), at(11, 30)),
            TradingWindow::new(at(13, 30), at(15, 0)),
            TradingWindow::new(at(21, 0), at(2, 30)),
        ]
    }
}

impl std::fmt::Display for TradingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RiskConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_order_size, 100);
        assert_eq!(config.max_daily_loss, dec!(50000));
        assert_eq!(config.max_position, 1000);
        assert_eq!(config.max_orders_per_second, 10);
        assert_eq!(config.max_price_deviation, dec!(0.05));
        assert!(config.trading_hours.is_empty());
        assert_eq!(config.symbol_value_limit(), dec!(1500000));
        assert_eq!(config.strategy_suspend_threshold, 100);
        assert_eq!(config.monitor_interval(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: RiskConfig = serde_json::from_str(
            r#"{"max_order_size": 5, "trading_hours": [{"start": "09:00:00", "end": "11:30:00"}]}"#,
        )
        .unwrap();
        assert_eq!(config.max_order_size, 5);
        assert_eq!(config.max_position, 1000);
        assert_eq!(config.trading_hours, vec![TradingWindow::new(t(9, 0), t(11, 30))]);
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let config = RiskConfig {
            max_order_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RiskError::InvalidLimit { field: "max_order_size", .. })
        ));

        let config = RiskConfig {
            max_price_deviation: dec!(-0.1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RiskConfig {
            max_concentration: dec!(1.5),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RiskError::InvalidLimit { field: "max_concentration", .. })
        ));

        let config = RiskConfig {
            trading_hours: vec![TradingWindow::new(t(9, 0), t(9, 0))],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(RiskError::InvalidWindow("09:00-09:00".to_string()))
        );
    }

    #[test]
    fn test_window_contains() {
        let morning = TradingWindow::new(t(9, 0), t(11, 30));
        assert!(morning.contains(t(9, 0)));
        assert!(morning.contains(t(11, 30)));
        assert!(!morning.contains(t(11, 31)));

        let night = TradingWindow::new(t(21, 0), t(2, 30));
        assert!(night.contains(t(23, 59)));
        assert!(night.contains(t(0, 15)));
        assert!(night.contains(t(2, 30)));
        assert!(!night.contains(t(2, 31)));
        assert!(!night.contains(t(20, 59)));
    }

    #[test]
    fn test_futures_sessions() {
        let sessions = TradingWindow::futures_sessions();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().any(|w| w.contains(t(14, 0))));
        assert!(!sessions.iter().any(|w| w.contains(t(12, 0))));
    }
}
