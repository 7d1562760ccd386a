//! Error types for the gateway crate

use hermes_core::{GatewayState, Symbol};
use thiserror::Error;

/// Vendor return codes meaning "too many requests in flight / per second"
pub const RATE_LIMITED_CODES: [i32; 2] = [-2, -3];

/// Code used for faults raised by the session itself rather than the vendor
pub const LOCAL_FAULT_CODE: i32 = -90;

/// Non-zero return code or error payload from the vendor SDK
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("vendor error {code}: {message}")]
pub struct VendorError {
    pub code: i32,
    pub message: String,
}

impl VendorError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self::new(LOCAL_FAULT_CODE, message)
    }

    pub fn is_rate_limited(&self) -> bool {
        RATE_LIMITED_CODES.contains(&self.code)
    }
}

/// Why an order was not handed to the vendor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("session not ready (state {0})")]
    NotReady(GatewayState),

    #[error("unknown contract {0}")]
    UnknownContract(Symbol),

    #[error("rejected by vendor: {0}")]
    Vendor(#[from] VendorError),
}

/// Session-level errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Vendor error: {0}")]
    Vendor(#[from] VendorError),

    #[error("Reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Session actor failed: {0}")]
    Actor(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_codes() {
        assert!(VendorError::new(-2, "in flight").is_rate_limited());
        assert!(VendorError::new(-3, "per second").is_rate_limited());
        assert!(!VendorError::new(-1, "network").is_rate_limited());
        assert!(!VendorError::local("timeout").is_rate_limited());
    }

    #[test]
    fn test_dispatch_error_messages() {
        let e = DispatchError::NotReady(GatewayState::LoggedIn);
        assert_eq!(e.to_string(), "session not ready (state LOGGED_IN)");
        let e: DispatchError = VendorError::new(22, "bad price").into();
        assert_eq!(e.to_string(), "rejected by vendor: vendor error 22: bad price");
    }
}
