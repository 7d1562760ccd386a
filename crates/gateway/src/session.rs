//! Gateway session actor
//!
//! One tokio task owns all mutable session state. Everything that can
//! change it arrives as a message: vendor callbacks, commands from bus
//! handlers, watchdog ticks and the session's own timers.
//!
//! ```text
//!   DISCONNECTED ─connect─► CONNECTING ─front connected─► CONNECTED
//!        ▲                                                   │ auth ok
//!        │ disconnect / heartbeat timeout                    ▼
//!        │                                            AUTHENTICATED
//!        │                                                   │ login ok
//!        │                 READY ◄─last page─ QUERYING ◄─────┴─ LOGGED_IN
//!        │                                   CONTRACTS   settlement
//!        └──────────── (any state)                       confirmed
//!
//!   vendor error during the handshake ──► ERROR
//! ```
//!
//! Order and trade returns that arrive before READY are held back and
//! replayed once, in arrival order, as soon as the contract table is loaded.

use chrono::Utc;
use hermes_bus::messages::{
    CancelDispatch, CancelFailure, ContractsReady, Disconnected, DispatchFailure, OrderAck,
    OrderDispatch, OrderUpdate, ReconnectFailed, StateChange, VendorFault,
};
use hermes_bus::{DispatchMode, Event, EventBus, EventPayload, SubscriptionId, handler, types};
use hermes_core::{ContractRef, GatewayState, OrderStatus, Symbol, TradeRecord};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ExhaustedPolicy, GatewayConfig};
use crate::contracts::{ContractBook, ContractMap};
use crate::error::{DispatchError, GatewayError, Result, VendorError};
use crate::routing::RoutingKey;
use crate::vendor::{
    CallbackInbox, VendorApi, VendorCallback, VendorCancelRequest, VendorOrder,
    VendorOrderRequest, VendorTrade,
};

pub const REASON_NETWORK_READ: i32 = 0x1001;
pub const REASON_NETWORK_WRITE: i32 = 0x1002;
pub const REASON_HEARTBEAT_TIMEOUT: i32 = 0x2001;
pub const REASON_HEARTBEAT_SEND: i32 = 0x2002;
pub const REASON_MALFORMED: i32 = 0x2003;

/// Human readable text for a vendor disconnect reason
pub fn disconnect_reason(code: i32) -> &'static str {
    match code {
        REASON_NETWORK_READ => "network read failed",
        REASON_NETWORK_WRITE => "network write failed",
        REASON_HEARTBEAT_TIMEOUT => "heartbeat receive timeout",
        REASON_HEARTBEAT_SEND => "heartbeat send failed",
        REASON_MALFORMED => "received malformed message",
        _ => "unknown reason",
    }
}

// ============================================================================
// Handle
// ============================================================================

#[derive(Debug)]
enum Command {
    Connect,
    SendOrder(OrderDispatch),
    CancelOrder(CancelDispatch),
    Subscribe(Symbol),
    QueryAccount,
    QueryPositions,
    Shutdown,
}

/// Read side of a session: state and contract table
#[derive(Debug, Clone)]
pub struct SessionView {
    state: watch::Receiver<GatewayState>,
    contracts: ContractBook,
}

impl SessionView {
    pub fn state(&self) -> GatewayState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn contracts(&self) -> &ContractBook {
        &self.contracts
    }

    pub fn contract(&self, symbol: &str) -> Option<ContractRef> {
        self.contracts.get(symbol)
    }

    /// Wait until the session reaches `target`. Returns false if the session
    /// stopped first.
    pub async fn wait_for(&self, target: GatewayState) -> bool {
        let mut state = self.state.clone();
        state.wait_for(|s| *s == target).await.is_ok()
    }
}

/// Owner's handle on a running session
pub struct SessionHandle {
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    view: SessionView,
    bus: Arc<EventBus>,
    subscriptions: Vec<SubscriptionId>,
    task: Option<JoinHandle<Result<()>>>,
}

impl SessionHandle {
    /// Spawn the session actor and attach its command handlers to the bus.
    /// The session stays DISCONNECTED until [`SessionHandle::connect`].
    pub fn spawn(
        config: GatewayConfig,
        bus: Arc<EventBus>,
        vendor: Arc<dyn VendorApi>,
        inbox: CallbackInbox,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(GatewayState::Disconnected);
        let contracts = ContractBook::new();
        let name = config.name.clone();

        let session = Session {
            config,
            bus: Arc::clone(&bus),
            vendor,
            state: state_tx,
            contracts: contracts.clone(),
            wake_tx,
            epoch: 0,
            login: None,
            last_ids: None,
            loading: HashMap::new(),
            sys_ids: HashMap::new(),
            sent: HashMap::new(),
            pending: VecDeque::new(),
            subscribed: Vec::new(),
            pending_subscriptions: Vec::new(),
            reconnect_attempts: 0,
            last_inbound: Instant::now(),
            exit: None,
        };
        let task = tokio::spawn(session.run(command_rx, inbox, wake_rx));

        let mut handle = Self {
            name,
            commands: command_tx,
            view: SessionView {
                state: state_rx,
                contracts,
            },
            bus,
            subscriptions: Vec::new(),
            task: Some(task),
        };
        handle.attach();
        handle
    }

    /// Route `gateway.*` commands addressed to this session into the actor
    fn attach(&mut self) {
        for event_type in [
            types::GATEWAY_SEND_ORDER,
            types::GATEWAY_CANCEL_ORDER,
            types::GATEWAY_SUBSCRIBE,
            types::GATEWAY_QUERY_ACCOUNT,
            types::GATEWAY_QUERY_POSITION,
        ] {
            let tx = self.commands.clone();
            let name = self.name.clone();
            let id = self.bus.subscribe(
                event_type,
                handler(move |event| {
                    if let Some((gateway, command)) = command_for(event.payload()) {
                        if gateway == name && tx.send(command).is_err() {
                            debug!("[GATEWAY] {} stopped, dropping {}", name, event.event_type());
                        }
                    }
                    Ok(())
                }),
                DispatchMode::Sync,
            );
            self.subscriptions.push(id);
        }
    }

    fn detach(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> SessionView {
        self.view.clone()
    }

    pub fn state(&self) -> GatewayState {
        self.view.state()
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn send_order(&self, dispatch: OrderDispatch) {
        self.command(Command::SendOrder(dispatch));
    }

    pub fn cancel_order(&self, cancel: CancelDispatch) {
        self.command(Command::CancelOrder(cancel));
    }

    pub fn subscribe(&self, symbol: impl Into<Symbol>) {
        self.command(Command::Subscribe(symbol.into()));
    }

    pub fn query_account(&self) {
        self.command(Command::QueryAccount);
    }

    pub fn query_positions(&self) {
        self.command(Command::QueryPositions);
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("[GATEWAY] {} is not running", self.name);
        }
    }

    /// Wait for the actor to stop on its own. Cancel-safe.
    pub async fn join(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let outcome = task.await;
        self.task = None;
        match outcome {
            Ok(result) => result,
            Err(e) => Err(GatewayError::Actor(e.to_string())),
        }
    }

    /// Close the vendor connection and stop the actor
    pub async fn shutdown(&mut self) -> Result<()> {
        self.detach();
        let _ = self.commands.send(Command::Shutdown);
        self.join().await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.detach();
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Bus command payload -> (addressed gateway, actor command)
fn command_for(payload: &EventPayload) -> Option<(&str, Command)> {
    match payload {
        EventPayload::SendOrder(d) => Some((d.gateway.as_str(), Command::SendOrder(d.clone()))),
        EventPayload::CancelOrder(c) => Some((c.gateway.as_str(), Command::CancelOrder(c.clone()))),
        EventPayload::Subscribe(s) => Some((s.gateway.as_str(), Command::Subscribe(s.symbol.clone()))),
        EventPayload::QueryAccount(q) => Some((q.gateway.as_str(), Command::QueryAccount)),
        EventPayload::QueryPosition(q) => Some((q.gateway.as_str(), Command::QueryPositions)),
        _ => None,
    }
}

// ============================================================================
// Actor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Settlement,
    Instruments,
    Account,
    Positions,
}

/// Timers the session sets for itself. `epoch` ties a timer to one
/// connection; timers from before the last disconnect are ignored.
#[derive(Debug)]
enum Wake {
    Reconnect { epoch: u64 },
    Retry { kind: QueryKind, attempt: u32, epoch: u64 },
    ContractTimeout { epoch: u64 },
}

/// Front and session ids of one login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionIds {
    front_id: i32,
    session_id: i32,
}

impl SessionIds {
    fn key(&self, order_ref: &str) -> RoutingKey {
        RoutingKey::new(self.front_id, self.session_id, order_ref)
    }
}

/// A return waiting for READY. Trades carry only an order ref, so they keep
/// the ids of the login they arrived under.
#[derive(Debug)]
enum Held {
    Order(VendorOrder),
    Trade(VendorTrade, Option<SessionIds>),
}

#[derive(Debug)]
struct LoginInfo {
    ids: SessionIds,
    last_order_ref: u64,
}

struct Session {
    config: GatewayConfig,
    bus: Arc<EventBus>,
    vendor: Arc<dyn VendorApi>,
    state: watch::Sender<GatewayState>,
    contracts: ContractBook,
    wake_tx: mpsc::UnboundedSender<Wake>,
    epoch: u64,
    login: Option<LoginInfo>,
    /// Ids of the latest login; kept while disconnected
    last_ids: Option<SessionIds>,
    /// Contracts received so far in the current load
    loading: ContractMap,
    /// Exchange order id -> routing key
    sys_ids: HashMap<String, String>,
    /// Orders handed to the vendor with no venue return yet, by routing key.
    /// Only these can still fail with an insert error.
    sent: HashMap<String, OrderDispatch>,
    pending: VecDeque<Held>,
    subscribed: Vec<Symbol>,
    pending_subscriptions: Vec<Symbol>,
    reconnect_attempts: u32,
    last_inbound: Instant,
    exit: Option<Result<()>>,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbox: CallbackInbox,
        mut wakes: mpsc::UnboundedReceiver<Wake>,
    ) -> Result<()> {
        let period = self.config.heartbeat.check_interval();
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[GATEWAY] {} session started", self.config.name);

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(callback) = inbox.recv() => self.on_callback(callback),
                Some(wake) = wakes.recv() => self.on_wake(wake),
                _ = watchdog.tick() => self.check_heartbeat(),
            }
            if let Some(exit) = self.exit.take() {
                self.vendor.close();
                error!("[GATEWAY] {} session terminated", self.config.name);
                return exit;
            }
        }

        self.vendor.close();
        info!("[GATEWAY] {} session stopped", self.config.name);
        Ok(())
    }

    fn current(&self) -> GatewayState {
        *self.state.borrow()
    }

    fn transition(&mut self, new_state: GatewayState) {
        let old_state = self.state.send_replace(new_state);
        if old_state == new_state {
            return;
        }
        info!("[GATEWAY] {} {} -> {}", self.config.name, old_state, new_state);
        self.publish(EventPayload::GatewayStateChanged(StateChange {
            gateway: self.config.name.clone(),
            old_state,
            new_state,
        }));
    }

    fn publish(&self, payload: EventPayload) {
        self.bus.publish(
            Event::new(payload).with_source(self.config.name.as_str()),
            DispatchMode::Sync,
        );
    }

    fn schedule(&self, delay: Duration, wake: Wake) {
        let tx = self.wake_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(wake);
        });
    }

    /// Relay a vendor error without changing state
    fn report(&self, error: &VendorError) {
        warn!("[GATEWAY] {} {}", self.config.name, error);
        self.publish(EventPayload::GatewayError(VendorFault {
            gateway: self.config.name.clone(),
            code: error.code,
            message: error.message.clone(),
            state: self.current(),
        }));
    }

    /// Protocol fault: relay the error and move to ERROR
    fn fail(&mut self, error: VendorError) {
        error!(
            "[GATEWAY] {} protocol fault in {}: {}",
            self.config.name,
            self.current(),
            error
        );
        self.report(&error);
        self.transition(GatewayState::Error);
    }

    fn in_handshake(&self) -> bool {
        matches!(
            self.current(),
            GatewayState::Connected
                | GatewayState::Authenticated
                | GatewayState::LoggedIn
                | GatewayState::QueryingContracts
        )
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => match self.current() {
                GatewayState::Disconnected | GatewayState::Error => {
                    self.reconnect_attempts = 0;
                    self.start_connect();
                }
                state => debug!("[GATEWAY] {} connect ignored in {}", self.config.name, state),
            },
            Command::SendOrder(dispatch) => self.on_send_order(dispatch),
            Command::CancelOrder(cancel) => self.on_cancel(cancel),
            Command::Subscribe(symbol) => self.on_subscribe(symbol),
            Command::QueryAccount => self.on_query(QueryKind::Account),
            Command::QueryPositions => self.on_query(QueryKind::Positions),
            Command::Shutdown => {}
        }
    }

    fn start_connect(&mut self) {
        self.transition(GatewayState::Connecting);
        self.last_inbound = Instant::now();
        info!(
            "[GATEWAY] {} connecting to {}",
            self.config.name, self.config.front_address
        );
        if let Err(e) = self.vendor.connect(&self.config.front_address) {
            warn!("[GATEWAY] {} connect failed: {}", self.config.name, e);
            self.on_disconnected(REASON_NETWORK_READ);
        }
    }

    fn on_send_order(&mut self, dispatch: OrderDispatch) {
        match self.place(&dispatch) {
            Ok(routing_key) => {
                debug!(
                    "[GATEWAY] {} order {} sent as {}",
                    self.config.name, dispatch.order_id, routing_key
                );
                self.publish(EventPayload::OrderSent(OrderAck {
                    order_id: dispatch.order_id,
                    routing_key,
                }));
            }
            Err(e) => {
                warn!(
                    "[GATEWAY] {} order {} not sent: {}",
                    self.config.name, dispatch.order_id, e
                );
                self.publish(EventPayload::OrderSendFailed(DispatchFailure {
                    order_id: dispatch.order_id,
                    reason: e.to_string(),
                }));
            }
        }
    }

    fn place(&mut self, dispatch: &OrderDispatch) -> std::result::Result<String, DispatchError> {
        let state = self.current();
        if state != GatewayState::Ready {
            return Err(DispatchError::NotReady(state));
        }
        if !self.contracts.contains(&dispatch.symbol) {
            return Err(DispatchError::UnknownContract(dispatch.symbol.clone()));
        }
        let login = self.login.as_mut().ok_or(DispatchError::NotReady(state))?;
        login.last_order_ref += 1;
        let key = login.ids.key(&login.last_order_ref.to_string());

        self.vendor.place_order(&VendorOrderRequest {
            order_ref: key.order_ref.clone(),
            symbol: dispatch.symbol.clone(),
            exchange: dispatch.exchange,
            direction: dispatch.direction,
            offset: dispatch.offset,
            order_type: dispatch.order_type,
            price: dispatch.price,
            volume: dispatch.volume,
        })?;

        let routing_key = key.to_string();
        self.sent.insert(routing_key.clone(), dispatch.clone());
        Ok(routing_key)
    }

    fn on_cancel(&mut self, cancel: CancelDispatch) {
        let Some(key) = RoutingKey::parse(&cancel.routing_key) else {
            let reason = format!("bad routing key {}", cancel.routing_key);
            self.cancel_failed(&cancel, reason);
            return;
        };
        if !self.current().is_logged_in() {
            let reason = format!("session not logged in (state {})", self.current());
            self.cancel_failed(&cancel, reason);
            return;
        }
        let sys_id = self
            .sys_ids
            .iter()
            .find(|(_, routing_key)| **routing_key == cancel.routing_key)
            .map(|(sys_id, _)| sys_id.clone());

        let request = VendorCancelRequest {
            front_id: key.front_id,
            session_id: key.session_id,
            order_ref: key.order_ref,
            sys_id,
            symbol: cancel.symbol.clone(),
            exchange: cancel.exchange,
        };
        if let Err(e) = self.vendor.cancel_order(&request) {
            self.report(&e);
            self.cancel_failed(&cancel, e.to_string());
        }
    }

    fn cancel_failed(&self, cancel: &CancelDispatch, reason: String) {
        warn!(
            "[GATEWAY] {} cannot cancel {}: {}",
            self.config.name, cancel.order_id, reason
        );
        self.publish(EventPayload::CancelFailed(CancelFailure {
            gateway: self.config.name.clone(),
            order_id: cancel.order_id.clone(),
            routing_key: cancel.routing_key.clone(),
            reason,
        }));
    }

    fn on_subscribe(&mut self, symbol: Symbol) {
        if self.subscribed.contains(&symbol) || self.pending_subscriptions.contains(&symbol) {
            debug!("[GATEWAY] {} already subscribed to {}", self.config.name, symbol);
            return;
        }
        if !self.current().is_logged_in() {
            debug!("[GATEWAY] {} queueing subscription {}", self.config.name, symbol);
            self.pending_subscriptions.push(symbol);
            return;
        }
        self.subscribe_now(symbol);
    }

    fn subscribe_now(&mut self, symbol: Symbol) {
        match self.vendor.subscribe(&symbol) {
            Ok(()) => self.subscribed.push(symbol),
            Err(e) => {
                warn!(
                    "[GATEWAY] {} subscribe {} failed: {}",
                    self.config.name, symbol, e
                );
                self.pending_subscriptions.push(symbol);
            }
        }
    }

    fn flush_subscriptions(&mut self) {
        let queued = std::mem::take(&mut self.pending_subscriptions);
        if !queued.is_empty() {
            info!(
                "[GATEWAY] {} replaying {} subscriptions",
                self.config.name,
                queued.len()
            );
        }
        for symbol in queued {
            self.subscribe_now(symbol);
        }
    }

    fn on_query(&mut self, kind: QueryKind) {
        if !self.current().is_logged_in() {
            warn!(
                "[GATEWAY] {} {:?} query ignored in {}",
                self.config.name,
                kind,
                self.current()
            );
            return;
        }
        self.issue_query(kind, 1);
    }

    fn query_allowed(&self, kind: QueryKind) -> bool {
        let state = self.current();
        match kind {
            QueryKind::Settlement => state == GatewayState::LoggedIn,
            QueryKind::Instruments => state == GatewayState::QueryingContracts,
            QueryKind::Account | QueryKind::Positions => state.is_logged_in(),
        }
    }

    /// Send a query; rate-limited calls are retried after a backoff
    fn issue_query(&mut self, kind: QueryKind, attempt: u32) {
        let result = match kind {
            QueryKind::Settlement => self.vendor.query_settlement(&self.config.credentials),
            QueryKind::Instruments => self.vendor.query_instruments(),
            QueryKind::Account => self.vendor.query_account(),
            QueryKind::Positions => self.vendor.query_positions(),
        };
        let Err(error) = result else {
            debug!("[GATEWAY] {} {:?} query sent", self.config.name, kind);
            return;
        };

        if error.is_rate_limited() {
            let retry = &self.config.query_retry;
            if attempt < retry.max_attempts {
                debug!(
                    "[GATEWAY] {} {:?} query rate limited (attempt {}/{}), retrying in {:?}",
                    self.config.name,
                    kind,
                    attempt,
                    retry.max_attempts,
                    retry.backoff()
                );
                self.schedule(
                    retry.backoff(),
                    Wake::Retry {
                        kind,
                        attempt: attempt + 1,
                        epoch: self.epoch,
                    },
                );
            } else {
                warn!(
                    "[GATEWAY] {} {:?} query still rate limited after {} attempts, giving up",
                    self.config.name, kind, attempt
                );
            }
            return;
        }

        match kind {
            QueryKind::Settlement | QueryKind::Instruments => self.fail(error),
            QueryKind::Account | QueryKind::Positions => self.report(&error),
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn on_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Reconnect { epoch } => {
                if epoch == self.epoch && self.current() == GatewayState::Disconnected {
                    self.start_connect();
                }
            }
            Wake::Retry {
                kind,
                attempt,
                epoch,
            } => {
                if epoch == self.epoch && self.query_allowed(kind) {
                    self.issue_query(kind, attempt);
                }
            }
            Wake::ContractTimeout { epoch } => {
                if epoch == self.epoch && self.current() == GatewayState::QueryingContracts {
                    self.fail(VendorError::local(format!(
                        "contract query timed out after {}ms",
                        self.config.contract_query_timeout_ms
                    )));
                }
            }
        }
    }

    fn check_heartbeat(&mut self) {
        if !self.current().is_connected() {
            return;
        }
        let silent = self.last_inbound.elapsed();
        if silent > self.config.heartbeat.timeout() {
            warn!(
                "[GATEWAY] {} nothing received for {:?}, assuming connection lost",
                self.config.name, silent
            );
            self.on_disconnected(REASON_HEARTBEAT_TIMEOUT);
        }
    }

    fn schedule_reconnect(&mut self) {
        let policy = self.config.reconnect.clone();
        if !policy.enabled {
            return;
        }
        if self.reconnect_attempts >= policy.max_attempts {
            error!(
                "[GATEWAY] {} reconnect failed {} times, giving up",
                self.config.name, self.reconnect_attempts
            );
            self.publish(EventPayload::ReconnectFailed(ReconnectFailed {
                gateway: self.config.name.clone(),
                attempts: self.reconnect_attempts,
            }));
            match policy.on_exhausted {
                ExhaustedPolicy::StayInError => self.transition(GatewayState::Error),
                ExhaustedPolicy::Terminate => {
                    self.exit = Some(Err(GatewayError::ReconnectExhausted {
                        attempts: self.reconnect_attempts,
                    }));
                }
            }
            return;
        }

        self.reconnect_attempts += 1;
        let delay = policy.delay_for(self.reconnect_attempts);
        info!(
            "[GATEWAY] {} reconnect attempt {}/{} in {:?}",
            self.config.name, self.reconnect_attempts, policy.max_attempts, delay
        );
        self.schedule(delay, Wake::Reconnect { epoch: self.epoch });
    }

    // ------------------------------------------------------------------------
    // Vendor callbacks
    // ------------------------------------------------------------------------

    fn on_callback(&mut self, callback: VendorCallback) {
        self.last_inbound = Instant::now();
        match callback {
            VendorCallback::FrontConnected => self.on_front_connected(),
            VendorCallback::FrontDisconnected { reason } => self.on_disconnected(reason),
            VendorCallback::AuthResponse { error } => self.on_auth(error),
            VendorCallback::LoginResponse {
                front_id,
                session_id,
                max_order_ref,
                error,
            } => self.on_login(front_id, session_id, max_order_ref, error),
            VendorCallback::SettlementConfirmed { error } => self.on_settlement(error),
            VendorCallback::InstrumentResponse {
                contract,
                is_last,
                error,
            } => self.on_instrument(contract, is_last, error),
            VendorCallback::OrderReturn(order) => self.hold_or_apply(Held::Order(order)),
            VendorCallback::TradeReturn(trade) => {
                let ids = self.last_ids;
                self.hold_or_apply(Held::Trade(trade, ids))
            }
            VendorCallback::OrderInsertError { order_ref, error } => {
                self.on_insert_error(&order_ref, error)
            }
            VendorCallback::PositionResponse {
                position,
                is_last,
                error,
            } => {
                if let Some(error) = error {
                    self.report(&error);
                }
                if let Some(position) = position {
                    self.publish(EventPayload::PositionUpdate(position));
                }
                if is_last {
                    debug!("[GATEWAY] {} position query complete", self.config.name);
                }
            }
            VendorCallback::AccountResponse { account, error } => {
                if let Some(error) = error {
                    self.report(&error);
                }
                if let Some(account) = account {
                    self.publish(EventPayload::AccountUpdate(account));
                }
            }
            VendorCallback::Tick(tick) => {
                let symbol = tick.symbol.clone();
                self.bus.publish(
                    Event::new(EventPayload::Tick(tick))
                        .with_source(self.config.name.as_str())
                        .routed(symbol),
                    DispatchMode::Async,
                );
            }
            VendorCallback::Error(error) => {
                if self.in_handshake() {
                    self.fail(error);
                } else {
                    self.report(&error);
                }
            }
        }
    }

    fn on_front_connected(&mut self) {
        match self.current() {
            GatewayState::Connecting | GatewayState::Disconnected => {}
            state => {
                debug!(
                    "[GATEWAY] {} front connected ignored in {}",
                    self.config.name, state
                );
                return;
            }
        }
        self.transition(GatewayState::Connected);

        if self.config.credentials.requires_auth() {
            if let Err(e) = self.vendor.authenticate(&self.config.credentials) {
                self.fail(e);
            }
        } else {
            self.transition(GatewayState::Authenticated);
            self.request_login();
        }
    }

    fn on_auth(&mut self, error: Option<VendorError>) {
        if self.current() != GatewayState::Connected {
            debug!("[GATEWAY] {} stray auth response", self.config.name);
            return;
        }
        match error {
            Some(e) => self.fail(e),
            None => {
                self.transition(GatewayState::Authenticated);
                self.request_login();
            }
        }
    }

    fn request_login(&mut self) {
        if let Err(e) = self.vendor.login(&self.config.credentials) {
            self.fail(e);
        }
    }

    fn on_login(
        &mut self,
        front_id: i32,
        session_id: i32,
        max_order_ref: u64,
        error: Option<VendorError>,
    ) {
        if self.current() != GatewayState::Authenticated {
            warn!(
                "[GATEWAY] {} login response ignored in {}",
                self.config.name,
                self.current()
            );
            return;
        }
        if let Some(e) = error {
            self.fail(e);
            return;
        }

        info!(
            "[GATEWAY] {} logged in (front {}, session {})",
            self.config.name, front_id, session_id
        );
        let ids = SessionIds {
            front_id,
            session_id,
        };
        self.login = Some(LoginInfo {
            ids,
            last_order_ref: max_order_ref,
        });
        self.last_ids = Some(ids);
        self.reconnect_attempts = 0;
        self.transition(GatewayState::LoggedIn);
        self.flush_subscriptions();
        self.issue_query(QueryKind::Settlement, 1);
    }

    fn on_settlement(&mut self, error: Option<VendorError>) {
        if self.current() != GatewayState::LoggedIn {
            debug!("[GATEWAY] {} stray settlement confirmation", self.config.name);
            return;
        }
        if let Some(e) = error {
            self.fail(e);
            return;
        }
        self.loading.clear();
        self.transition(GatewayState::QueryingContracts);
        self.schedule(
            self.config.contract_query_timeout(),
            Wake::ContractTimeout { epoch: self.epoch },
        );
        self.issue_query(QueryKind::Instruments, 1);
    }

    fn on_instrument(
        &mut self,
        contract: Option<ContractRef>,
        is_last: bool,
        error: Option<VendorError>,
    ) {
        if self.current() != GatewayState::QueryingContracts {
            debug!("[GATEWAY] {} stray instrument page", self.config.name);
            return;
        }
        if let Some(e) = error {
            self.fail(e);
            return;
        }
        if let Some(contract) = contract {
            self.loading.insert(contract.symbol.clone(), contract);
        }
        if is_last {
            self.finish_contract_load();
        }
    }

    fn finish_contract_load(&mut self) {
        let loaded = std::mem::take(&mut self.loading);
        let count = loaded.len();
        self.contracts.replace(loaded);
        info!("[GATEWAY] {} loaded {} contracts", self.config.name, count);

        self.transition(GatewayState::Ready);
        self.publish(EventPayload::ContractsReady(ContractsReady {
            gateway: self.config.name.clone(),
            count,
        }));

        let held: Vec<Held> = self.pending.drain(..).collect();
        if !held.is_empty() {
            info!(
                "[GATEWAY] {} replaying {} held order/trade returns",
                self.config.name,
                held.len()
            );
        }
        for item in held {
            self.apply(item);
        }

        self.issue_query(QueryKind::Account, 1);
        self.issue_query(QueryKind::Positions, 1);
    }

    fn on_disconnected(&mut self, code: i32) {
        if self.current() == GatewayState::Disconnected {
            debug!(
                "[GATEWAY] {} already disconnected, ignoring reason {:#x}",
                self.config.name, code
            );
            return;
        }
        let reason = disconnect_reason(code);
        warn!(
            "[GATEWAY] {} disconnected: {} ({:#x})",
            self.config.name, reason, code
        );

        self.epoch += 1;
        self.login = None;
        self.sys_ids.clear();
        self.sent.clear();
        self.loading.clear();
        self.contracts.clear();
        let mut remembered = std::mem::take(&mut self.subscribed);
        for symbol in std::mem::take(&mut self.pending_subscriptions) {
            if !remembered.contains(&symbol) {
                remembered.push(symbol);
            }
        }
        self.pending_subscriptions = remembered;

        self.transition(GatewayState::Disconnected);
        self.publish(EventPayload::GatewayDisconnected(Disconnected {
            gateway: self.config.name.clone(),
            reason_code: code,
            reason: reason.to_string(),
        }));
        self.schedule_reconnect();
    }

    // ------------------------------------------------------------------------
    // Order and trade returns
    // ------------------------------------------------------------------------

    fn hold_or_apply(&mut self, item: Held) {
        if self.current() != GatewayState::Ready {
            debug!("[GATEWAY] {} holding return until READY", self.config.name);
            self.pending.push_back(item);
            return;
        }
        self.apply(item);
    }

    fn apply(&mut self, item: Held) {
        let symbol = match &item {
            Held::Order(order) => &order.symbol,
            Held::Trade(trade, _) => &trade.symbol,
        };
        if !self.contracts.contains(symbol) {
            warn!(
                "[GATEWAY] {} return for unknown contract {}, skipped",
                self.config.name, symbol
            );
            return;
        }
        match item {
            Held::Order(order) => self.apply_order(order),
            Held::Trade(trade, ids) => self.apply_trade(trade, ids),
        }
    }

    fn apply_order(&mut self, order: VendorOrder) {
        let routing_key =
            RoutingKey::new(order.front_id, order.session_id, order.order_ref.as_str()).to_string();
        let sys_id = (!order.sys_id.is_empty()).then(|| order.sys_id.clone());
        if let Some(sys_id) = &sys_id {
            self.sys_ids.insert(sys_id.clone(), routing_key.clone());
        }
        // the venue has the order; no insert error can follow
        self.sent.remove(&routing_key);

        self.publish(EventPayload::VendorOrder(OrderUpdate {
            gateway: self.config.name.clone(),
            routing_key,
            sys_id,
            symbol: order.symbol,
            exchange: order.exchange,
            direction: order.direction,
            offset: order.offset,
            price: order.price,
            volume: order.volume,
            traded: order.traded,
            status: order.status,
            message: order.message,
            timestamp: Utc::now(),
        }));
    }

    /// Route by exchange order id, else by the order ref under the login
    /// the trade arrived with
    fn apply_trade(&mut self, trade: VendorTrade, ids: Option<SessionIds>) {
        let routing_key = match self.sys_ids.get(&trade.sys_id) {
            Some(key) => key.clone(),
            None => match ids {
                Some(ids) => ids.key(&trade.order_ref).to_string(),
                None => {
                    warn!(
                        "[GATEWAY] {} trade {} cannot be routed",
                        self.config.name, trade.trade_id
                    );
                    return;
                }
            },
        };

        self.publish(EventPayload::VendorTrade(TradeRecord {
            trade_id: trade.trade_id,
            routing_key,
            order_id: None,
            symbol: trade.symbol,
            exchange: trade.exchange,
            direction: trade.direction,
            offset: trade.offset,
            price: trade.price,
            volume: trade.volume,
            timestamp: trade.timestamp,
        }));
    }

    fn on_insert_error(&mut self, order_ref: &str, error: VendorError) {
        let Some(login) = &self.login else {
            warn!(
                "[GATEWAY] {} insert error for {} outside a session: {}",
                self.config.name, order_ref, error
            );
            return;
        };
        let routing_key = login.ids.key(order_ref).to_string();
        let Some(dispatch) = self.sent.remove(&routing_key) else {
            warn!(
                "[GATEWAY] {} insert error for unknown order {}: {}",
                self.config.name, routing_key, error
            );
            return;
        };

        warn!(
            "[GATEWAY] {} order {} rejected by venue: {}",
            self.config.name, dispatch.order_id, error
        );
        self.publish(EventPayload::VendorOrder(OrderUpdate {
            gateway: self.config.name.clone(),
            routing_key,
            sys_id: None,
            symbol: dispatch.symbol,
            exchange: dispatch.exchange,
            direction: dispatch.direction,
            offset: dispatch.offset,
            price: dispatch.price,
            volume: dispatch.volume,
            traded: 0,
            status: OrderStatus::Rejected,
            message: error.to_string(),
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_table() {
        assert_eq!(disconnect_reason(0x1001), "network read failed");
        assert_eq!(disconnect_reason(0x1002), "network write failed");
        assert_eq!(disconnect_reason(0x2001), "heartbeat receive timeout");
        assert_eq!(disconnect_reason(0x2002), "heartbeat send failed");
        assert_eq!(disconnect_reason(0x2003), "received malformed message");
        assert_eq!(disconnect_reason(7), "unknown reason");
    }
}
