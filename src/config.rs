//! Configuration loading (spec §6).
//!
//! Top-level process configuration: where the database lives, how to reach
//! the broker, which data sources to use, and where the tradeable universe
//! is defined. The trading `Rules` (spec §3) are embedded here rather than
//! duplicated, so one JSON file configures both the process and the engine.
//! Follows the reference crate's `Config::from_file` pattern: load JSON,
//! then let environment variables override secrets.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::rules::Rules;

/// Process-level configuration (spec §6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub data_source: DataSourceConfig,
    pub universe_file: String,
    /// Directory the `csv` data source reads `{symbol}.csv` files from.
    pub data_dir: String,
    pub rules: Rules,
}

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides
    /// for broker secrets.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(api_key) = std::env::var("BROKER_API_KEY") {
            config.broker.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BROKER_API_SECRET") {
            config.broker.api_secret = Some(api_secret);
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            broker: BrokerConfig::default(),
            data_source: DataSourceConfig::default(),
            universe_file: "universe.json".to_string(),
            data_dir: "data".to_string(),
            rules: Rules::default(),
        }
    }
}

/// SQLite database location (spec §6 "database URL").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "turtle.db".to_string(),
        }
    }
}

/// Broker connection details (spec §6 "broker endpoint + account id").
/// `endpoint`/`account_id`/`api_key`/`api_secret` are unused by `PaperBroker`
/// today — this is the shape a future real broker adapter would bind to;
/// `commission_per_contract` is the one field `PaperBroker` itself reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub account_id: String,
    pub commission_per_contract: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            endpoint: "paper://local".to_string(),
            account_id: "paper".to_string(),
            commission_per_contract: dec!(2.5),
            api_key: None,
            api_secret: None,
        }
    }
}

/// Primary/fallback data source toggles (spec §6, §7 `DataSourceUnavailable`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceConfig {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        DataSourceConfig {
            primary: "csv".to_string(),
            fallback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(parsed.universe_file, config.universe_file);
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let json = r#"{
            "database": {"url": "turtle.db"},
            "broker": {"endpoint": "paper://local", "account_id": "paper", "commission_per_contract": "2.5"},
            "data_source": {"primary": "csv"},
            "universe_file": "universe.json",
            "data_dir": "data",
            "rules": {
                "risk_factor": "0.005", "stop_multiplier": "2", "pyramid_interval": "0.5",
                "max_units_per_market": 4, "max_units_correlated": 6,
                "max_total_exposure_mode": {"mode": "UNIT_CAP", "max_total_units": 12},
                "atr_period": 20, "atr_method": "WILDERS",
                "periods": {"s1_entry": 20, "s2_entry": 55, "s1_exit": 10, "s2_exit": 20},
                "drawdown_trigger": "0.10", "drawdown_notional_reduction": "0.20",
                "notional_floor": "0.40", "check_interval_secs": 60, "days_before_expiry": 14
            },
            "unknown_field": true
        }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn env_override_sets_broker_secrets() {
        std::env::set_var("BROKER_API_KEY", "test-key");
        std::env::set_var("BROKER_API_SECRET", "test-secret");

        let dir = std::env::temp_dir().join(format!("turtle-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, serde_json::to_string(&Config::default()).unwrap()).unwrap();

        let loaded = Config::from_file(&path).expect("load");
        assert_eq!(loaded.broker.api_key.as_deref(), Some("test-key"));
        assert_eq!(loaded.broker.api_secret.as_deref(), Some("test-secret"));

        std::env::remove_var("BROKER_API_KEY");
        std::env::remove_var("BROKER_API_SECRET");
        std::fs::remove_dir_all(&dir).ok();
    }
}
