//! Configuration loading for the swap watcher
//!
//! Settings come from a TOML file; credentials can be supplied or overridden
//! through environment variables so they stay out of the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_TENDERLY_PROJECT_ID: &str = "TENDERLY_PROJECT_ID";
pub const ENV_TENDERLY_JWT: &str = "TENDERLY_JWT";

/// Upper bound for every interval and timeout setting (one week)
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub alerts: AlertsConfig,
    pub control: ControlConfig,
    pub tenderly: TenderlyConfig,
    pub pools: Vec<PoolConfig>,
}

/// Telegram delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    /// When false, notifications are only written to the log
    pub enabled: bool,
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    /// Per-request timeout for the Bot API
    pub timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Alert batching settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    /// Batch alerts into digests instead of sending each one
    pub queueing_enabled: bool,
    /// Minimum spacing between deliveries when batching
    pub min_interval_seconds: u64,
    /// How often the periodic flush check runs
    pub tick_interval_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            queueing_enabled: false,
            min_interval_seconds: 30,
            tick_interval_seconds: 5,
        }
    }
}

/// Location and refresh cadence of the control file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub path: String,
    pub refresh_interval_seconds: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            path: "ccs.json".to_string(),
            refresh_interval_seconds: 20,
        }
    }
}

/// Tenderly access used to build debug links for transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TenderlyConfig {
    pub project_id: Option<String>,
    pub jwt: Option<String>,
    /// Account slug used in dashboard links
    pub account: String,
    /// Endpoint listing recent fork transactions
    pub transactions_url: Option<String>,
    pub dashboard_url: String,
}

impl Default for TenderlyConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            jwt: None,
            account: String::new(),
            transactions_url: None,
            dashboard_url: "https://dashboard.tenderly.co".to_string(),
        }
    }
}

/// A watched Uniswap V3 pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    pub address: String,
    pub symbol0: String,
    pub symbol1: String,
    pub decimals0: u32,
    pub decimals1: u32,
    #[serde(default = "default_swap_category")]
    pub category: String,
}

fn default_swap_category() -> String {
    "Uniswap V3 Swap".to_string()
}

impl PoolConfig {
    /// The USDC/WETH 0.05% pool on mainnet
    pub fn usdc_weth() -> Self {
        Self {
            address: "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640".to_string(),
            symbol0: "USDC".to_string(),
            symbol1: "WETH".to_string(),
            decimals0: 6,
            decimals1: 18,
            category: default_swap_category(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// An empty `pools` list falls back to the USDC/WETH pool.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read, a TOML
    /// error if it cannot be parsed, and `ConfigError::ValidationError` if a
    /// value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        if config.pools.is_empty() {
            config.pools.push(PoolConfig::usdc_weth());
        }
        config.validate()?;
        Ok(config)
    }

    /// Override credentials from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override credentials using `lookup`; empty values are ignored
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = get(ENV_TELEGRAM_TOKEN) {
            self.telegram.token = Some(token);
        }
        if let Some(chat_id) = get(ENV_TELEGRAM_CHAT_ID) {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(project_id) = get(ENV_TENDERLY_PROJECT_ID) {
            self.tenderly.project_id = Some(project_id);
        }
        if let Some(jwt) = get(ENV_TENDERLY_JWT) {
            self.tenderly.jwt = Some(jwt);
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alerts.tick_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "alerts.tick_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.telegram.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "telegram.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("alerts.min_interval_seconds", self.alerts.min_interval_seconds),
            ("alerts.tick_interval_seconds", self.alerts.tick_interval_seconds),
            ("control.refresh_interval_seconds", self.control.refresh_interval_seconds),
            ("telegram.timeout_seconds", self.telegram.timeout_seconds),
        ] {
            if value > MAX_INTERVAL_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be at most {} seconds",
                    name, MAX_INTERVAL_SECONDS
                )));
            }
        }
        if self.control.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "control.path must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for pool in &self.pools {
            if pool.address.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "pool address must not be empty".to_string(),
                ));
            }
            if pool.decimals0 > 36 || pool.decimals1 > 36 {
                return Err(ConfigError::ValidationError(format!(
                    "pool {} has decimals above 36",
                    pool.address
                )));
            }
            if pool.category.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pool {} has an empty category",
                    pool.address
                )));
            }
            if !seen.insert(pool.address.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "pool {} is listed twice",
                    pool.address
                )));
            }
        }

        Ok(())
    }

    /// Make sure delivery credentials are present
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredential` naming the first missing
    /// value when Telegram delivery is enabled.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if !self.telegram.enabled {
            return Ok(());
        }
        if self.telegram.token.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingCredential(
                ENV_TELEGRAM_TOKEN.to_string(),
            ));
        }
        if self.telegram.chat_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingCredential(
                ENV_TELEGRAM_CHAT_ID.to_string(),
            ));
        }
        Ok(())
    }

    /// Default configuration with the built-in pool list
    pub fn with_default_pools() -> Self {
        Self {
            pools: vec![PoolConfig::usdc_weth()],
            ..Self::default()
        }
    }
}
