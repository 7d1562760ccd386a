//! Vendor SDK boundary
//!
//! The session talks to a broker SDK through [`VendorApi`]. Requests return
//! the SDK's immediate return code; answers come back later as
//! [`VendorCallback`]s pushed into a [`CallbackSink`] from whatever thread the
//! SDK owns.
//!
//! ```text
//!   session actor ──request──► VendorApi ──► SDK
//!        ▲                                    │ (SDK thread)
//!        └──── CallbackInbox ◄── CallbackSink ◄┘
//! ```

use hermes_core::{
    AccountRecord, ContractRef, Direction, Exchange, Offset, OrderStatus, OrderType, PositionRecord,
    Price, Symbol, TickData, Timestamp, Volume,
};
use tokio::sync::mpsc;

use crate::config::Credentials;
use crate::error::VendorError;

pub type VendorResult = std::result::Result<(), VendorError>;

/// Order insert fields sent to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct VendorOrderRequest {
    pub order_ref: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: Price,
    pub volume: Volume,
}

/// Order action fields; the venue identifies the order by front, session
/// and order ref, or by its system id when known
#[derive(Debug, Clone, PartialEq)]
pub struct VendorCancelRequest {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: String,
    pub sys_id: Option<String>,
    pub symbol: Symbol,
    pub exchange: Exchange,
}

/// Order return as reported by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct VendorOrder {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: String,
    /// Exchange-assigned id; empty until the exchange accepts the order
    pub sys_id: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Price,
    pub volume: Volume,
    pub traded: Volume,
    pub status: OrderStatus,
    pub message: String,
}

/// Trade return; carries the order's system id and order ref but not its
/// front and session
#[derive(Debug, Clone, PartialEq)]
pub struct VendorTrade {
    pub trade_id: String,
    pub sys_id: String,
    pub order_ref: String,
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Price,
    pub volume: Volume,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VendorCallback {
    FrontConnected,
    FrontDisconnected {
        reason: i32,
    },
    AuthResponse {
        error: Option<VendorError>,
    },
    LoginResponse {
        front_id: i32,
        session_id: i32,
        /// Highest order ref used so far in this trading day
        max_order_ref: u64,
        error: Option<VendorError>,
    },
    SettlementConfirmed {
        error: Option<VendorError>,
    },
    InstrumentResponse {
        contract: Option<ContractRef>,
        is_last: bool,
        error: Option<VendorError>,
    },
    OrderReturn(VendorOrder),
    TradeReturn(VendorTrade),
    OrderInsertError {
        order_ref: String,
        error: VendorError,
    },
    PositionResponse {
        position: Option<PositionRecord>,
        is_last: bool,
        error: Option<VendorError>,
    },
    AccountResponse {
        account: Option<AccountRecord>,
        error: Option<VendorError>,
    },
    Tick(TickData),
    Error(VendorError),
}

/// Requests understood by a broker SDK
///
/// Calls must not block; answers arrive through the callback sink.
pub trait VendorApi: Send + Sync {
    fn connect(&self, address: &str) -> VendorResult;
    fn authenticate(&self, credentials: &Credentials) -> VendorResult;
    fn login(&self, credentials: &Credentials) -> VendorResult;
    fn query_settlement(&self, credentials: &Credentials) -> VendorResult;
    fn query_instruments(&self) -> VendorResult;
    fn query_account(&self) -> VendorResult;
    fn query_positions(&self) -> VendorResult;
    fn subscribe(&self, symbol: &str) -> VendorResult;
    fn place_order(&self, order: &VendorOrderRequest) -> VendorResult;
    fn cancel_order(&self, cancel: &VendorCancelRequest) -> VendorResult;
    fn close(&self);
}

/// Thread-safe entry point for SDK callbacks. Never blocks, never drops.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    tx: mpsc::UnboundedSender<VendorCallback>,
}

impl CallbackSink {
    /// Returns false once the session is gone
    pub fn send(&self, callback: VendorCallback) -> bool {
        self.tx.send(callback).is_ok()
    }
}

/// Receiving half, owned by the session actor
#[derive(Debug)]
pub struct CallbackInbox {
    rx: mpsc::UnboundedReceiver<VendorCallback>,
}

impl CallbackInbox {
    pub(crate) async fn recv(&mut self) -> Option<VendorCallback> {
        self.rx.recv().await
    }
}

pub fn callback_channel() -> (CallbackSink, CallbackInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CallbackSink { tx }, CallbackInbox { rx })
}
