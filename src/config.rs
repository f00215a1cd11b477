//! Configuration management for the Secret transaction submitter
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Network settings are plain data; key material is never part of the file,
//! only the name of the environment variable that holds it.

use crate::chain::BroadcastMode;
use crate::tx::{FeeSpec, GasPrice};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Environment variable pointing at the configuration file
pub const CONFIG_PATH_ENV: &str = "SECRET_SUBMITTER_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub submitter: SubmitterConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: String,
    pub lcd_urls: Vec<String>,
    #[serde(default = "default_bech32_prefix")]
    pub bech32_prefix: String,
    #[serde(default = "default_fee_denom")]
    pub fee_denom: String,
    /// Price for requests without a fee; no fallback when unset
    pub gas_price: Option<String>,
    /// Gas limit for requests without a fee; no fallback when unset
    pub default_gas_limit: Option<u64>,
    #[serde(default = "default_ibc_timeout_secs")]
    pub ibc_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitterConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub broadcast_mode: BroadcastMode,
    #[serde(default = "default_gas_adjustment_percent")]
    pub gas_adjustment_percent: u64,
    #[serde(default = "default_max_concurrent_txs")]
    pub max_concurrent_txs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub textfile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_bech32_prefix() -> String {
    "secret".to_string()
}

fn default_fee_denom() -> String {
    "uscrt".to_string()
}

fn default_ibc_timeout_secs() -> u64 {
    600
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_gas_adjustment_percent() -> u64 {
    20
}

fn default_max_concurrent_txs() -> usize {
    4
}

fn default_private_key_env() -> String {
    "SECRET_PRIVATE_KEY".to_string()
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            broadcast_mode: BroadcastMode::default(),
            gas_adjustment_percent: default_gas_adjustment_percent(),
            max_concurrent_txs: default_max_concurrent_txs(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl Settings {
    /// Load settings from the file named by `SECRET_SUBMITTER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.chain_id.trim().is_empty() {
            anyhow::bail!("network.chain_id must not be empty");
        }

        if self.network.lcd_urls.is_empty() {
            anyhow::bail!("network.lcd_urls must contain at least one URL");
        }

        for url in &self.network.lcd_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("LCD URL {} must use http or https", url);
            }
        }

        if self.network.gas_price.is_some() {
            let gas_price = self.gas_price()?;
            if gas_price.denom() != self.network.fee_denom {
                tracing::warn!(
                    "Gas price denomination {} differs from fee denomination {}",
                    gas_price.denom(),
                    self.network.fee_denom
                );
            }
        }

        if self.network.default_gas_limit == Some(0) {
            anyhow::bail!("network.default_gas_limit must be positive");
        }

        if self.submitter.max_concurrent_txs == 0 {
            anyhow::bail!("submitter.max_concurrent_txs must be positive");
        }

        if self.metrics.enabled && self.metrics.textfile_path.is_none() {
            anyhow::bail!("metrics.textfile_path is required when metrics are enabled");
        }

        Ok(())
    }

    /// Configured gas price, required for fee estimation
    pub fn gas_price(&self) -> Result<GasPrice> {
        let raw = self
            .network
            .gas_price
            .as_deref()
            .context("network.gas_price is not configured")?;
        raw.parse()
            .with_context(|| format!("Invalid network.gas_price {}", raw))
    }

    /// Fee for requests that carry none, only when both the gas price and
    /// the gas limit are configured
    pub fn default_fee(&self) -> Result<Option<FeeSpec>> {
        match self.network.default_gas_limit {
            Some(gas_limit) if self.network.gas_price.is_some() => {
                Ok(Some(FeeSpec::from_gas_price(self.gas_price()?, gas_limit)))
            }
            _ => Ok(None),
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
