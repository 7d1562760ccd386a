//! Hermes Bus
//!
//! Event routing backbone of the Hermes trading session core. Provides:
//! - [`EventBus`]: in-process pub/sub with sync and async channels,
//!   priority queues, timers, monitors and per-handler fault isolation
//! - [`ServiceRegistry`]: heartbeat presence directory driven by bus events
//! - [`DistributedEventBus`]: the same envelope relayed across processes
//!   over a topic-per-type transport
//!
//! ## Architecture
//!
//! ```text
//!  Gateway session ──┐                         ┌──► Order pipeline
//!  Strategies ───────┼──► EventBus (sync/async)┼──► Account manager
//!  Registry ─────────┘        │                └──► Strategies
//!                             │ monitor
//!                     DistributedEventBus ◄──── TCP ────► peer process
//! ```

pub mod bus;
pub mod distributed;
pub mod error;
pub mod event;
pub mod messages;
pub mod registry;

// Re-export commonly used types
pub use bus::{
    BusConfig, BusStats, EventBus, Handler, HandlerResult, PublishOutcome, SubscriptionId, handler,
};
pub use distributed::{
    DistributedConfig, DistributedEventBus,
    transport::{
        WireMessage, WirePublisher, WireSubscriber,
        memory::{MemoryHub, MemoryPublisher, MemorySubscriber},
        tcp::{TcpPublisher, TcpSubscriber},
    },
};
pub use error::{BusError, CodecError, HandlerError, TransportError};
pub use event::{DispatchMode, Event, EventPayload, Priority, types};
pub use registry::{RegistryConfig, ServiceRegistry};
