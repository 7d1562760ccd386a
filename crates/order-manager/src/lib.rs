//! Hermes Order Manager
//!
//! The order side of the trading core:
//! - **Placement**: intents are risk-checked, recorded and dispatched to the
//!   gateway session only while it is READY and knows the contract
//! - **Reconciliation**: venue order returns and fills are matched back to
//!   records through the `{front_id}_{session_id}_{order_ref}` routing key
//! - **Accounts**: fills, position and account reports keep a lock-free
//!   snapshot that the risk gate reads
//!
//! ## Order lifecycle
//!
//! ```text
//! SUBMITTING ──► NOT_TRADED ──► PART_TRADED ──► ALL_TRADED
//!     │               │               │
//!     ├──► REJECTED   └───────────────┴──► CANCELLED
//!     └──► (fills or CANCELLED directly)
//! ```
//!
//! Invalid or stale transitions are logged and dropped. Terminal records
//! move to the archive.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hermes_order_manager::{OrderPipeline, PipelineConfig};
//!
//! let pipeline = OrderPipeline::start(PipelineConfig::default(), RiskConfig::default(), &bus, session.view())?;
//! let id = pipeline.orders.place(intent).await?;
//! ```

pub mod account;
pub mod book;
pub mod config;
pub mod error;
pub mod manager;
pub mod pipeline;

// Re-export main types
pub use account::{AccountManager, AccountSnapshot};
pub use book::OrderBook;
pub use config::PipelineConfig;
pub use error::{CancelError, OrderError, PlaceError, Result};
pub use manager::OrderManager;
pub use pipeline::OrderPipeline;
