//! Hermes Runner
//!
//! Assembles a complete trading session core from one configuration file:
//!
//! - **Config**: [`EngineConfig`], one section per component
//! - **Engine**: [`TradingEngine`], start order, service announcements,
//!   optional cross-process relay, and ordered shutdown
//!
//! ## Architecture
//!
//! ```text
//!               ┌──────────────────────────────────────────────┐
//!               │                  EventBus                    │
//!               └──┬──────────┬───────────────┬────────────┬───┘
//!                  │          │               │            │ monitor
//!          ┌───────▼──┐ ┌─────▼──────┐ ┌──────▼───────┐ ┌──▼──────────────┐
//!          │ Service  │ │  Gateway   │ │    Order     │ │ Distributed bus │
//!          │ registry │ │  session   │ │   pipeline   │ │   (optional)    │
//!          └──────────┘ └─────┬──────┘ │ risk/orders/ │ └──┬──────────────┘
//!                             │        │   accounts   │    │ TCP
//!                     ┌───────▼──────┐ └──────────────┘    ▼
//!                     │  Simulated   │                  peer process
//!                     │    vendor    │
//!                     └──────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;

pub use config::{EngineConfig, SimulatorConfig};
pub use engine::{StopReason, TradingEngine};
pub use error::{ConfigError, EngineError, Result};
