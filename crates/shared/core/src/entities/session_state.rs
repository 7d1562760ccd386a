use serde::{Deserialize, Serialize};

/// Life cycle of one gateway connection
///
/// ```text
/// Disconnected ─► Connecting ─► Connected ─► Authenticated ─► LoggedIn
///                                                               │
///                              Ready ◄─ QueryingContracts ◄─────┘
/// ```
///
/// Any disconnect returns to `Disconnected`; vendor faults during the
/// handshake move to `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GatewayState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    LoggedIn,
    QueryingContracts,
    Ready,
    Error,
}

impl GatewayState {
    /// Returns true once the login handshake has completed
    pub fn is_logged_in(&self) -> bool {
        matches!(
            self,
            GatewayState::LoggedIn | GatewayState::QueryingContracts | GatewayState::Ready
        )
    }

    /// Returns true while the transport is believed to be up
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            GatewayState::Connected
                | GatewayState::Authenticated
                | GatewayState::LoggedIn
                | GatewayState::QueryingContracts
                | GatewayState::Ready
        )
    }

    pub fn is_ready(&self) -> bool {
        *self == GatewayState::Ready
    }
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayState::Disconnected => "DISCONNECTED",
            GatewayState::Connecting => "CONNECTING",
            GatewayState::Connected => "CONNECTED",
            GatewayState::Authenticated => "AUTHENTICATED",
            GatewayState::LoggedIn => "LOGGED_IN",
            GatewayState::QueryingContracts => "QUERYING_CONTRACTS",
            GatewayState::Ready => "READY",
            GatewayState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}
