//! Hermes Risk Manager
//!
//! Pre-trade gate in front of the order manager. An intent is checked
//! against static limits and the current exposure before any order record
//! exists for it.
//!
//! ## Architecture
//!
//! ```text
//!   OrderIntent ──► ┌──────────────────────────────────────────────┐
//!                   │                RiskManager                   │
//!                   │                                              │
//!                   │   tokio::join!(                              │
//!                   │     trading hours   order size  order value  │
//!                   │     daily loss      position    exposure     │
//!                   │     frequency       price sanity             │
//!                   │     strategy errors )                        │
//!                   │            │                                 │
//!                   │            ▼                                 │
//!                   │   aggregate: sort by check, max level        │
//!                   └────────────┬─────────────────────────────────┘
//!                                │ RiskCheckResult
//!                                ▼
//!                          OrderManager
//!
//!   ExposureView (positions, daily pnl, last prices, contracts)
//!        ▲
//!        └── AccountManager snapshots
//!
//!   strategy.error ──► record_error ──► monitor ──► risk.strategy_suspended
//! ```
//!
//! ## Checks
//!
//! | Check              | Fails when                                        | Level    |
//! |--------------------|---------------------------------------------------|----------|
//! | trading_hours      | local time is in no configured window             | critical |
//! | order_size         | volume is zero or above `max_order_size`          | high     |
//! | order_value        | price x volume x multiplier above the limit       | high     |
//! | daily_loss         | opening while the day's loss reached the limit    | critical |
//! | position_limit     | opening past `max_position` in that direction     | high     |
//! | total_position     | opening past `max_total_position` book notional   | high     |
//! | concentration      | one symbol above its share of the total limit     | medium   |
//! | frequency          | strategy sent `max_orders_per_second` already     | high     |
//! | price_sanity       | price not positive, off tick, or too far off last | high+    |
//! | strategy_suspended | opening after too many reported errors            | critical |

pub mod config;
pub mod error;
pub mod exposure;
pub mod frequency;
pub mod manager;

// Re-export main types
pub use config::{RiskConfig, TradingWindow};
pub use error::{Result, RiskError};
pub use exposure::{ExposureSnapshot, ExposureView};
pub use frequency::FrequencyWindow;
pub use manager::{CheckOutcome, LocalClock, RiskCheck, RiskCheckResult, RiskManager, RiskViolation, Suspension};
