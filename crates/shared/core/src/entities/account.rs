use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funds snapshot for the trading account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    pub balance: Decimal,
    pub frozen: Decimal,
    pub available: Decimal,
}

impl AccountRecord {
    pub fn new(account_id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            balance,
            frozen: Decimal::ZERO,
            available: balance,
        }
    }
}
