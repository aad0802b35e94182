//! Configuration management for the exchange service
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub exchange: ExchangeConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub assets: HashMap<String, AssetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Asset the exchange holds in reserve and pays out 1:1
    pub anchor_asset: String,
    /// The exchange's own account id on every asset ledger
    pub account: String,
    #[serde(default = "default_sample_interval")]
    pub reserve_sample_interval_secs: u64,
}

fn default_sample_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Balances credited when the ledger is created (account -> amount).
    /// Used to seed the exchange reserve on deployment.
    #[serde(default)]
    pub genesis_balances: HashMap<String, u128>,
}

fn default_decimals() -> u8 {
    18
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("WRAPPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = toml::from_str(&config_str)
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            anyhow::bail!("At least one asset must be configured");
        }

        // The anchor must be one of the configured assets
        if !self.assets.contains_key(&self.exchange.anchor_asset) {
            anyhow::bail!(
                "Anchor asset {} is not among the configured assets",
                self.exchange.anchor_asset
            );
        }

        if self.exchange.account.is_empty() {
            anyhow::bail!("Exchange account id must not be empty");
        }

        for (id, asset) in &self.assets {
            if asset.symbol.is_empty() {
                tracing::warn!("Asset {} has no symbol configured", id);
            }
        }

        Ok(())
    }

    /// Get asset config by id
    pub fn get_asset(&self, id: &str) -> Option<&AssetConfig> {
        self.assets.get(id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
