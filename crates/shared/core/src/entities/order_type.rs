use serde::{Deserialize, Serialize};

/// Order types accepted by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at specified price or better
    #[default]
    Limit,
    /// Execute at current market price
    Market,
    /// Triggered when price reaches the stop price
    Stop,
    /// Fill and kill: fill what is possible, cancel the rest
    Fak,
    /// Fill or kill: fill completely or cancel
    Fok,
}
