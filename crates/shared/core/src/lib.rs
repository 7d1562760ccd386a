//! Hermes Core Domain
//!
//! Pure domain types shared by the bus, the gateway session and the order
//! pipeline: contracts, order intents and records, fills, positions and
//! accounts. This crate contains no async and no I/O.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    AccountRecord, ContractRef, Direction, Exchange, GatewayState, Offset, OrderId, OrderIntent,
    OrderRecord, OrderStatus, OrderType, PositionKey, PositionRecord, ProductKind, RiskLevel,
    TickData, TradeRecord,
};
pub use values::{Price, Symbol, Timestamp, Volume};
