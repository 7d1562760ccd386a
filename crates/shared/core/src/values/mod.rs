use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Lot count. Futures venues trade whole contracts.
pub type Volume = u32;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Venue symbol, e.g. `rb2510`
pub type Symbol = String;
