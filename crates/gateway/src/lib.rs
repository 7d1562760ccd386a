//! Hermes Gateway
//!
//! Broker session layer for the Hermes trading core. Provides:
//! - The vendor SDK boundary (`VendorApi` requests, `VendorCallback` answers)
//! - The session state machine, run as one actor per broker connection
//! - Contract table snapshots for the order pipeline
//! - A simulated vendor for tests and dry runs
//!
//! ## Architecture
//!
//! ```text
//!   EventBus ── gateway.send_order / cancel_order / subscribe / query_* ──┐
//!      ▲                                                                   │
//!      │ gateway.order, gateway.trade, order.sent,                   ┌─────▼─────┐
//!      │ gateway.state_changed, market.tick, ...                     │  session  │
//!      └─────────────────────────────────────────────────────────────┤   actor   │
//!                                                                    └─────┬─────┘
//!                                                            VendorApi ▲   │ CallbackSink
//!                                                                      │   ▼
//!                                                                  broker SDK / simulator
//! ```
//!
//! Commands on the bus carry a gateway name; a session only acts on its own.

pub mod adapters;
pub mod config;
pub mod contracts;
pub mod error;
pub mod routing;
pub mod session;
pub mod vendor;

// Re-export commonly used types
pub use adapters::{CallKind, SimulatedVendor, VendorCall};
pub use config::{
    Credentials, ExhaustedPolicy, GatewayConfig, HeartbeatConfig, QueryRetryConfig,
    ReconnectConfig,
};
pub use contracts::ContractBook;
pub use error::{DispatchError, GatewayError, Result, VendorError};
pub use routing::RoutingKey;
pub use session::{SessionHandle, SessionView, disconnect_reason};
pub use vendor::{
    CallbackInbox, CallbackSink, VendorApi, VendorCallback, VendorCancelRequest, VendorOrder,
    VendorOrderRequest, VendorTrade, callback_channel,
};
