//! # Pool Configuration
//!
//! Unified configuration for the host, the storage module and every feature
//! module. Each feature module is enabled by its own section carrying a
//! `module` identifier; absent sections are simply not loaded.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use openpool_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load("config/openpool.yaml")?;
//! let config = manager.config();
//! println!("storage module: {}", config.storage_module);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::units::BASIS_POINTS;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Base directory for module-relative resources such as spool files
    #[serde(default)]
    pub module_path: Option<PathBuf>,

    /// Identifier of the storage module providing the ledger
    pub storage_module: String,

    /// Pool commission taken from job fees, as a fraction in `[0, 1)`
    #[serde(default)]
    pub pool_commission_rate: f64,

    /// Deployment version tag
    #[serde(default)]
    pub version: String,

    /// Region tag; also the default region for workers whose events carry none
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub data_loader: Option<DataLoaderConfig>,

    #[serde(default)]
    pub payout_loop: Option<PayoutLoopConfig>,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub reporter: Option<ReporterConfig>,
}

/// Connection settings for the `postgres` storage module
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Data-loader module settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataLoaderConfig {
    pub module: String,
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_seconds: u64,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
}

fn default_fetch_interval() -> u64 {
    30
}

impl DataLoaderConfig {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_seconds)
    }
}

/// One remote data source polled by the data loader
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataSourceConfig {
    pub endpoint: String,
    /// Node type assumed for this source's events when a payload omits it
    #[serde(default)]
    pub node_type: String,
}

/// Payout module settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PayoutLoopConfig {
    pub module: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub private_key_store_path: String,
    #[serde(default)]
    pub private_key_passphrase_path: String,
    #[serde(default = "default_payout_frequency")]
    pub payout_frequency_seconds: u64,
    /// Minimum pending balance, in smallest units, before a worker is paid
    pub payout_threshold: String,
    /// Record payouts without submitting transactions
    #[serde(default)]
    pub dry_run: bool,
}

fn default_payout_frequency() -> u64 {
    3600
}

impl PayoutLoopConfig {
    pub fn payout_frequency(&self) -> Duration {
        Duration::from_secs(self.payout_frequency_seconds)
    }

    pub fn threshold_wei(&self) -> ConfigResult<i64> {
        self.payout_threshold
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|t| *t > 0)
            .ok_or_else(|| {
                ConfigurationError::invalid_value(
                    "payout_loop.payout_threshold",
                    self.payout_threshold.clone(),
                    "must be a positive integer amount in smallest units",
                )
            })
    }
}

/// API module settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiConfig {
    pub module: String,
    #[serde(default)]
    pub server_port: Option<u16>,
}

/// Ledger reporter module settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReporterConfig {
    pub module: String,
    #[serde(default = "default_report_interval")]
    pub interval_seconds: u64,
}

fn default_report_interval() -> u64 {
    60
}

impl PoolConfig {
    /// Minimal configuration using the given storage module
    pub fn with_storage(storage_module: impl Into<String>) -> Self {
        Self {
            module_path: None,
            storage_module: storage_module.into(),
            pool_commission_rate: 0.0,
            version: String::new(),
            region: String::new(),
            database: None,
            data_loader: None,
            payout_loop: None,
            api: None,
            reporter: None,
        }
    }

    /// Commission rate in basis points
    pub fn commission_bps(&self) -> i64 {
        (self.pool_commission_rate * BASIS_POINTS as f64).round() as i64
    }

    /// Identifiers of every configured feature module, in declaration order
    pub fn feature_modules(&self) -> Vec<String> {
        [
            self.api.as_ref().map(|c| c.module.as_str()),
            self.payout_loop.as_ref().map(|c| c.module.as_str()),
            self.data_loader.as_ref().map(|c| c.module.as_str()),
            self.reporter.as_ref().map(|c| c.module.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage_module.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "storage_module",
                "pool configuration",
            ));
        }

        if !(0.0..1.0).contains(&self.pool_commission_rate) {
            return Err(ConfigurationError::invalid_value(
                "pool_commission_rate",
                self.pool_commission_rate.to_string(),
                "must be within [0, 1)",
            ));
        }

        if let Some(loader) = &self.data_loader {
            if loader.fetch_interval_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    "data_loader.fetch_interval_seconds",
                    "0",
                    "must be positive",
                ));
            }
            if let Some(source) = loader.data_sources.iter().find(|s| s.endpoint.is_empty()) {
                return Err(ConfigurationError::invalid_value(
                    "data_loader.data_sources.endpoint",
                    source.endpoint.clone(),
                    "endpoint must not be empty",
                ));
            }
        }

        if let Some(payout) = &self.payout_loop {
            payout.threshold_wei()?;
            if payout.payout_frequency_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    "payout_loop.payout_frequency_seconds",
                    "0",
                    "must be positive",
                ));
            }
        }

        if let Some(reporter) = &self.reporter {
            if reporter.interval_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    "reporter.interval_seconds",
                    "0",
                    "must be positive",
                ));
            }
        }

        Ok(())
    }
}
