//! # OpenPool Host
//!
//! Loads a pool configuration, bootstraps the configured storage and feature
//! modules, and runs them until Ctrl-C.
//!
//! ```bash
//! openpool [config-path]        # defaults to config/openpool.yaml
//! OPENPOOL_ENV=production openpool config/openpool.yaml
//! ```

use anyhow::Context;
use openpool_core::config::ConfigManager;
use openpool_core::logging::init_structured_logging;
use openpool_core::orchestration::{PoolHost, DEFAULT_SHUTDOWN_TIMEOUT};
use openpool_core::registry::CapabilityRegistry;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/openpool.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    info!(config_path = %config_path, "🚀 Starting OpenPool host");

    let config_manager = ConfigManager::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    let registry = CapabilityRegistry::with_builtins();

    let host = PoolHost::bootstrap(config_manager, &registry)
        .await
        .context("failed to bootstrap pool")?;
    let handle = host.start();

    let result = handle
        .run_until(
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
            },
            DEFAULT_SHUTDOWN_TIMEOUT,
        )
        .await;

    match &result {
        Ok(()) => info!("👋 OpenPool host stopped"),
        Err(e) => error!(error = %e, "OpenPool host stopped with errors"),
    }
    result.context("shutdown did not complete cleanly")
}
