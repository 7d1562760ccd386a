//! Order Manager errors

use hermes_core::{GatewayState, OrderId, OrderStatus, RiskLevel, Symbol};
use hermes_risk_manager::RiskError;
use thiserror::Error;

/// Why `place` refused an intent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaceError {
    #[error("Risk check failed ({level}): {}", .reasons.join("; "))]
    Risk {
        level: RiskLevel,
        reasons: Vec<String>,
    },

    #[error("Gateway {gateway} not ready (state {state})")]
    NotReady {
        gateway: String,
        state: GatewayState,
    },

    #[error("Unknown contract: {0}")]
    UnknownContract(Symbol),

    #[error("Order pipeline stopped")]
    Stopped,
}

/// Why `cancel` refused a request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CancelError {
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("Order {order_id} already {status}")]
    Terminal {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Order {0} not yet acknowledged by the gateway")]
    NotAcknowledged(OrderId),

    #[error("Order pipeline stopped")]
    Stopped,
}

/// Pipeline construction errors
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Risk(#[from] RiskError),
}

pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = PlaceError::Risk {
            level: RiskLevel::High,
            reasons: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Risk check failed (high): a; b");

        let err = PlaceError::NotReady {
            gateway: "ctp".to_string(),
            state: GatewayState::QueryingContracts,
        };
        assert!(err.to_string().starts_with("Gateway ctp not ready"));

        let err = CancelError::Terminal {
            order_id: "o1".to_string(),
            status: OrderStatus::AllTraded,
        };
        assert_eq!(err.to_string(), "Order o1 already ALL_TRADED");
    }
}
