//! Gateway session configuration

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Session name; commands on the bus are addressed by it
    pub name: String,
    pub front_address: String,
    pub credentials: Credentials,
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectConfig,
    pub query_retry: QueryRetryConfig,
    /// READY must be reached this long after contract querying starts
    pub contract_query_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "ctp".to_string(),
            front_address: "tcp://127.0.0.1:10130".to_string(),
            credentials: Credentials::default(),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            query_retry: QueryRetryConfig::default(),
            contract_query_timeout_ms: 60000,
        }
    }
}

impl GatewayConfig {
    pub fn contract_query_timeout(&self) -> Duration {
        Duration::from_millis(self.contract_query_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub broker_id: String,
    pub user_id: String,
    pub password: String,
    pub app_id: String,
    /// Terminal authentication is skipped when absent
    pub auth_code: Option<String>,
}

impl Credentials {
    pub fn requires_auth(&self) -> bool {
        self.auth_code.as_deref().is_some_and(|code| !code.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub check_interval_ms: u64,
    /// Silence longer than this is treated as a lost connection
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30000,
            timeout_ms: 60000,
        }
    }
}

impl HeartbeatConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// What the session does once every reconnect attempt has failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Move to ERROR and keep accepting commands
    #[default]
    StayInError,
    /// Stop the session actor
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub on_exhausted: ExhaustedPolicy,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            base_delay_ms: 5000,
            max_delay_ms: 60000,
            on_exhausted: ExhaustedPolicy::StayInError,
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt `attempt` (1-based): `min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryRetryConfig {
    /// Total calls, including the first one
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for QueryRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 1000,
        }
    }
}

impl QueryRetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
