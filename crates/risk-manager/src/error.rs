//! Risk Manager errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid risk limit {field}: {reason}")]
    InvalidLimit { field: &'static str, reason: String },

    #[error("Invalid trading window {0}")]
    InvalidWindow(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;
