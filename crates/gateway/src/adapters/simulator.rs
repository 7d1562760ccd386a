//! Simulated broker SDK
//!
//! Records every request and, when auto-respond is on, answers through the
//! callback sink the way a live front would: handshake callbacks, one
//! instrument page per configured contract, order returns and (optionally)
//! immediate fills at the limit price. Failures can be scripted per request
//! kind to exercise retry and error paths.

use chrono::Utc;
use hermes_core::{AccountRecord, ContractRef, OrderStatus, PositionRecord, TickData};
use log::debug;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crate::config::Credentials;
use crate::error::VendorError;
use crate::vendor::{
    CallbackSink, VendorApi, VendorCallback, VendorCancelRequest, VendorOrder,
    VendorOrderRequest, VendorResult, VendorTrade,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Connect,
    Authenticate,
    Login,
    QuerySettlement,
    QueryInstruments,
    QueryAccount,
    QueryPositions,
    Subscribe,
    PlaceOrder,
    CancelOrder,
    Close,
}

/// One recorded request
#[derive(Debug, Clone, PartialEq)]
pub enum VendorCall {
    Connect(String),
    Authenticate,
    Login,
    QuerySettlement,
    QueryInstruments,
    QueryAccount,
    QueryPositions,
    Subscribe(String),
    PlaceOrder(VendorOrderRequest),
    CancelOrder(VendorCancelRequest),
    Close,
}

impl VendorCall {
    pub fn kind(&self) -> CallKind {
        match self {
            VendorCall::Connect(_) => CallKind::Connect,
            VendorCall::Authenticate => CallKind::Authenticate,
            VendorCall::Login => CallKind::Login,
            VendorCall::QuerySettlement => CallKind::QuerySettlement,
            VendorCall::QueryInstruments => CallKind::QueryInstruments,
            VendorCall::QueryAccount => CallKind::QueryAccount,
            VendorCall::QueryPositions => CallKind::QueryPositions,
            VendorCall::Subscribe(_) => CallKind::Subscribe,
            VendorCall::PlaceOrder(_) => CallKind::PlaceOrder,
            VendorCall::CancelOrder(_) => CallKind::CancelOrder,
            VendorCall::Close => CallKind::Close,
        }
    }
}

pub struct SimulatedVendor {
    sink: CallbackSink,
    auto_respond: bool,
    fill_orders: bool,
    front_id: i32,
    contracts: Vec<ContractRef>,
    account: AccountRecord,
    positions: Vec<PositionRecord>,
    session_id: AtomicI32,
    next_sys_id: AtomicU64,
    next_trade_id: AtomicU64,
    calls: Mutex<Vec<VendorCall>>,
    failures: Mutex<HashMap<CallKind, VecDeque<VendorError>>>,
    /// Live orders by order ref
    orders: Mutex<HashMap<String, VendorOrder>>,
}

impl SimulatedVendor {
    /// Passive vendor: records requests, never answers
    pub fn new(sink: CallbackSink) -> Self {
        Self {
            sink,
            auto_respond: false,
            fill_orders: false,
            front_id: 1,
            contracts: Vec::new(),
            account: AccountRecord::new("sim", Decimal::from(1_000_000)),
            positions: Vec::new(),
            session_id: AtomicI32::new(0),
            next_sys_id: AtomicU64::new(1),
            next_trade_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Answer every request the way a healthy front would
    pub fn auto_respond(mut self) -> Self {
        self.auto_respond = true;
        self
    }

    /// Fill every accepted order in full at its limit price
    pub fn with_fills(mut self) -> Self {
        self.fill_orders = true;
        self
    }

    pub fn with_contracts(mut self, contracts: Vec<ContractRef>) -> Self {
        self.contracts = contracts;
        self
    }

    pub fn with_account(mut self, account: AccountRecord) -> Self {
        self.account = account;
        self
    }

    pub fn with_positions(mut self, positions: Vec<PositionRecord>) -> Self {
        self.positions = positions;
        self
    }

    /// Make the next request of `kind` return `error` instead of succeeding
    pub fn fail_next(&self, kind: CallKind, error: VendorError) {
        self.failures.lock().entry(kind).or_default().push_back(error);
    }

    pub fn calls(&self) -> Vec<VendorCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    pub fn placed_orders(&self) -> Vec<VendorOrderRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                VendorCall::PlaceOrder(order) => Some(order.clone()),
                _ => None,
            })
            .collect()
    }

    /// Deliver an arbitrary callback, as the SDK thread would
    pub fn push(&self, callback: VendorCallback) {
        if !self.sink.send(callback) {
            debug!("[SIM] session gone, callback dropped");
        }
    }

    pub fn drop_connection(&self, reason: i32) {
        self.push(VendorCallback::FrontDisconnected { reason });
    }

    pub fn tick(&self, tick: TickData) {
        self.push(VendorCallback::Tick(tick));
    }

    pub fn current_session_id(&self) -> i32 {
        self.session_id.load(Ordering::SeqCst)
    }

    pub fn front_id(&self) -> i32 {
        self.front_id
    }

    fn record(&self, call: VendorCall) -> VendorResult {
        let kind = call.kind();
        self.calls.lock().push(call);
        match self.failures.lock().get_mut(&kind).and_then(|q| q.pop_front()) {
            Some(error) => {
                debug!("[SIM] {:?} fails with {}", kind, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn order_return(&self, order: &VendorOrder) {
        self.push(VendorCallback::OrderReturn(order.clone()));
    }

    fn fill(&self, order: &mut VendorOrder) {
        let trade_id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let volume = order.volume - order.traded;
        self.push(VendorCallback::TradeReturn(VendorTrade {
            trade_id: format!("T{}", trade_id),
            sys_id: order.sys_id.clone(),
            order_ref: order.order_ref.clone(),
            symbol: order.symbol.clone(),
            exchange: order.exchange,
            direction: order.direction,
            offset: order.offset,
            price: order.price,
            volume,
            timestamp: Utc::now(),
        }));
        order.traded = order.volume;
        order.status = OrderStatus::AllTraded;
        order.message = "filled".to_string();
        self.order_return(order);
    }
}

impl VendorApi for SimulatedVendor {
    fn connect(&self, address: &str) -> VendorResult {
        self.record(VendorCall::Connect(address.to_string()))?;
        if self.auto_respond {
            self.push(VendorCallback::FrontConnected);
        }
        Ok(())
    }

    fn authenticate(&self, _credentials: &Credentials) -> VendorResult {
        self.record(VendorCall::Authenticate)?;
        if self.auto_respond {
            self.push(VendorCallback::AuthResponse { error: None });
        }
        Ok(())
    }

    fn login(&self, _credentials: &Credentials) -> VendorResult {
        self.record(VendorCall::Login)?;
        let session_id = self.session_id.fetch_add(1, Ordering::SeqCst) + 1;
        if self.auto_respond {
            self.push(VendorCallback::LoginResponse {
                front_id: self.front_id,
                session_id,
                max_order_ref: 0,
                error: None,
            });
        }
        Ok(())
    }

    fn query_settlement(&self, _credentials: &Credentials) -> VendorResult {
        self.record(VendorCall::QuerySettlement)?;
        if self.auto_respond {
            self.push(VendorCallback::SettlementConfirmed { error: None });
        }
        Ok(())
    }

    fn query_instruments(&self) -> VendorResult {
        self.record(VendorCall::QueryInstruments)?;
        if !self.auto_respond {
            return Ok(());
        }
        if self.contracts.is_empty() {
            self.push(VendorCallback::InstrumentResponse {
                contract: None,
                is_last: true,
                error: None,
            });
        }
        let last = self.contracts.len().saturating_sub(1);
        for (i, contract) in self.contracts.iter().enumerate() {
            self.push(VendorCallback::InstrumentResponse {
                contract: Some(contract.clone()),
                is_last: i == last,
                error: None,
            });
        }
        Ok(())
    }

    fn query_account(&self) -> VendorResult {
        self.record(VendorCall::QueryAccount)?;
        if self.auto_respond {
            self.push(VendorCallback::AccountResponse {
                account: Some(self.account.clone()),
                error: None,
            });
        }
        Ok(())
    }

    fn query_positions(&self) -> VendorResult {
        self.record(VendorCall::QueryPositions)?;
        if !self.auto_respond {
            return Ok(());
        }
        if self.positions.is_empty() {
            self.push(VendorCallback::PositionResponse {
                position: None,
                is_last: true,
                error: None,
            });
        }
        let last = self.positions.len().saturating_sub(1);
        for (i, position) in self.positions.iter().enumerate() {
            self.push(VendorCallback::PositionResponse {
                position: Some(position.clone()),
                is_last: i == last,
                error: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self, symbol: &str) -> VendorResult {
        self.record(VendorCall::Subscribe(symbol.to_string()))
    }

    fn place_order(&self, order: &VendorOrderRequest) -> VendorResult {
        self.record(VendorCall::PlaceOrder(order.clone()))?;
        if !self.auto_respond {
            return Ok(());
        }

        let sys_id = self.next_sys_id.fetch_add(1, Ordering::SeqCst);
        let mut live = VendorOrder {
            front_id: self.front_id,
            session_id: self.current_session_id(),
            order_ref: order.order_ref.clone(),
            sys_id: format!("{:012}", sys_id),
            symbol: order.symbol.clone(),
            exchange: order.exchange,
            direction: order.direction,
            offset: order.offset,
            price: order.price,
            volume: order.volume,
            traded: 0,
            status: OrderStatus::NotTraded,
            message: "accepted".to_string(),
        };
        self.order_return(&live);
        if self.fill_orders {
            self.fill(&mut live);
        }
        self.orders.lock().insert(live.order_ref.clone(), live);
        Ok(())
    }

    fn cancel_order(&self, cancel: &VendorCancelRequest) -> VendorResult {
        self.record(VendorCall::CancelOrder(cancel.clone()))?;
        if !self.auto_respond {
            return Ok(());
        }
        let mut orders = self.orders.lock();
        match orders.get_mut(&cancel.order_ref) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                order.message = "cancelled".to_string();
                self.order_return(order);
                Ok(())
            }
            _ => Err(VendorError::new(25, "order not found or already finished")),
        }
    }

    fn close(&self) {
        let _ = self.record(VendorCall::Close);
    }
}
