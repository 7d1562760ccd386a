//! Engine configuration
//!
//! One JSON document with a section per component. Every section is
//! optional; missing fields take their defaults.
//!
//! ```json
//! {
//!   "gateway": { "name": "ctp", "reconnect": { "max_attempts": 5 } },
//!   "pipeline": { "gateway": "ctp" },
//!   "risk": { "max_order_size": 20, "max_daily_loss": "20000" },
//!   "simulator": { "fill_orders": true }
//! }
//! ```

use crate::error::ConfigError;
use hermes_bus::{BusConfig, DistributedConfig, RegistryConfig};
use hermes_core::{AccountRecord, ContractRef, Exchange, ProductKind};
use hermes_gateway::{CallbackSink, GatewayConfig, SimulatedVendor};
use hermes_order_manager::PipelineConfig;
use hermes_risk_manager::RiskConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bus: BusConfig,
    pub registry: RegistryConfig,
    pub gateway: GatewayConfig,
    pub risk: RiskConfig,
    pub pipeline: PipelineConfig,
    pub distributed: DistributedConfig,
    pub simulator: SimulatorConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-section checks that no single component can make on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.name.is_empty() {
            return Err(ConfigError::Invalid("gateway.name is empty".to_string()));
        }
        if self.pipeline.gateway != self.gateway.name {
            return Err(ConfigError::Invalid(format!(
                "pipeline.gateway '{}' does not name the configured session '{}'",
                self.pipeline.gateway, self.gateway.name
            )));
        }
        if self.pipeline.shards == 0 {
            return Err(ConfigError::Invalid("pipeline.shards must be positive".to_string()));
        }
        self.risk
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("risk: {}", e)))?;
        if self.distributed.enabled && self.distributed.publish_address == self.distributed.peer_address {
            return Err(ConfigError::Invalid(format!(
                "distributed bus would subscribe to itself at {}",
                self.distributed.publish_address
            )));
        }
        Ok(())
    }
}

/// Vendor stand-in the engine drives when no broker SDK is linked
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Answer handshake and query requests like a healthy front
    pub auto_respond: bool,
    /// Fill accepted orders in full at their limit price
    pub fill_orders: bool,
    pub account_id: String,
    pub balance: Decimal,
    pub contracts: Vec<ContractRef>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            auto_respond: true,
            fill_orders: false,
            account_id: "sim".to_string(),
            balance: Decimal::from(1_000_000),
            contracts: vec![
                futures("rb2510", Exchange::Shfe, "rebar 2510", Decimal::from(10), Decimal::ONE),
                futures("au2512", Exchange::Shfe, "gold 2512", Decimal::from(1000), Decimal::new(2, 2)),
                futures("IF2509", Exchange::Cffex, "CSI 300 2509", Decimal::from(300), Decimal::new(2, 1)),
            ],
        }
    }
}

impl SimulatorConfig {
    pub fn build(&self, sink: CallbackSink) -> SimulatedVendor {
        let mut vendor = SimulatedVendor::new(sink)
            .with_contracts(self.contracts.clone())
            .with_account(AccountRecord::new(self.account_id.clone(), self.balance));
        if self.auto_respond {
            vendor = vendor.auto_respond();
        }
        if self.fill_orders {
            vendor = vendor.with_fills();
        }
        vendor
    }
}

fn futures(symbol: &str, exchange: Exchange, name: &str, multiplier: Decimal, tick_size: Decimal) -> ContractRef {
    ContractRef {
        symbol: symbol.to_string(),
        exchange,
        name: name.to_string(),
        product: ProductKind::Futures,
        multiplier,
        tick_size,
        min_volume: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.gateway.name, "ctp");
        assert_eq!(config.pipeline.gateway, "ctp");
        assert!(!config.distributed.enabled);
        assert!(config.simulator.auto_respond);
        assert_eq!(config.simulator.contracts.len(), 3);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = EngineConfig::from_json(
            r#"{
                "gateway": { "name": "sim", "reconnect": { "max_attempts": 3 } },
                "pipeline": { "gateway": "sim", "shards": 2 },
                "risk": { "max_order_size": 20, "max_daily_loss": "20000" },
                "simulator": {
                    "fill_orders": true,
                    "contracts": [{
                        "symbol": "ag2512", "exchange": "Shfe", "name": "silver",
                        "product": "Futures", "multiplier": "15", "tick_size": "1",
                        "min_volume": 1
                    }]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.reconnect.max_attempts, 3);
        assert_eq!(config.pipeline.shards, 2);
        assert_eq!(config.risk.max_order_size, 20);
        assert_eq!(config.risk.max_daily_loss, dec!(20000));
        assert_eq!(config.risk.max_position, 1000);
        assert!(config.simulator.fill_orders);
        assert_eq!(config.simulator.contracts[0].multiplier, dec!(15));
    }

    #[test]
    fn test_pipeline_must_target_the_session() {
        let err = EngineConfig::from_json(r#"{"gateway": {"name": "sim"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("'ctp'"));
    }

    #[test]
    fn test_risk_limits_validated() {
        let err = EngineConfig::from_json(r#"{"risk": {"max_order_size": 0}}"#).unwrap_err();
        assert!(err.to_string().contains("max_order_size"));
    }

    #[test]
    fn test_distributed_self_loop_rejected() {
        let err = EngineConfig::from_json(
            r#"{"distributed": {"enabled": true, "publish_address": "127.0.0.1:7000", "peer_address": "127.0.0.1:7000"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_and_missing_files() {
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/hermes.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
