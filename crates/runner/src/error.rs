use hermes_bus::{BusError, TransportError};
use hermes_gateway::GatewayError;
use hermes_order_manager::OrderError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Order pipeline: {0}")]
    Pipeline(#[from] OrderError),

    #[error("Distributed bus: {0}")]
    Bus(#[from] BusError),

    #[error("Gateway: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        EngineError::Bus(BusError::Transport(e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_wrap_as_bus() {
        let err: EngineError = TransportError::Connection("refused".to_string()).into();
        assert!(matches!(err, EngineError::Bus(BusError::Transport(_))));
        assert_eq!(
            err.to_string(),
            "Distributed bus: Transport error: Connection failed: refused"
        );
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: EngineError = ConfigError::Invalid("bad".to_string()).into();
        assert_eq!(err.to_string(), "Invalid config: bad");
    }
}
