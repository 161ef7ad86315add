//! # Pool Bootstrap
//!
//! Brings the pool up in two phases:
//!
//! 1. [`PoolHost::bootstrap`] resolves and initializes the storage module,
//!    then resolves and initializes every configured feature module against
//!    the resulting ledger. Any unknown identifier or failed `init` aborts
//!    here, before anything runs.
//! 2. [`PoolHost::start`] spawns every module's `start` concurrently and
//!    returns a [`PoolHandle`]. Modules are not restarted; one that fails is
//!    logged, marked [`ModuleState::Failed`] and left stopped while the others
//!    keep running.
//!
//! Shutdown is cooperative: [`PoolHandle::shutdown`] cancels the shared
//! token and waits, up to a timeout, for every module to return.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};

use crate::capabilities::Capability;
use crate::config::{ConfigManager, ConfigurationError};
use crate::error::{PoolError, Result};
use crate::ledger::WorkerLedger;
use crate::logging::{log_capability_operation, log_error};
use crate::registry::CapabilityRegistry;

/// Default time modules get to return after cancellation
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime state of one hosted module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    Running,
    Stopped,
    Failed(String),
}

/// System status information
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub running: bool,
    pub environment: String,
    pub storage_backend: String,
    pub modules: Vec<(String, ModuleState)>,
}

/// Initialized pool that has not started any module yet
pub struct PoolHost {
    config_manager: Arc<ConfigManager>,
    ledger: Arc<dyn WorkerLedger>,
    modules: Vec<(String, Arc<dyn Capability>)>,
}

impl PoolHost {
    /// Resolve and initialize the storage module and every feature module.
    #[instrument(skip_all, fields(storage = %config_manager.config().storage_module))]
    pub async fn bootstrap(
        config_manager: Arc<ConfigManager>,
        registry: &CapabilityRegistry,
    ) -> Result<Self> {
        info!("🚀 BOOTSTRAP: Starting pool bootstrap");
        let config = config_manager.config();

        let storage_name = config.storage_module.as_str();
        let storage = registry.resolve_storage(storage_name)?;
        let ledger = storage.init(config).await.map_err(|e| {
            PoolError::from(ConfigurationError::module_init_error(storage_name, e))
        })?;
        log_capability_operation("init", storage_name, "initialized", Some(ledger.backend_name()));

        let mut modules = Vec::new();
        for name in config.feature_modules() {
            let mut module = registry.create_feature(&name)?;
            module
                .init(config, ledger.clone())
                .await
                .map_err(|e| PoolError::from(ConfigurationError::module_init_error(&name, e)))?;
            log_capability_operation("init", &name, "initialized", None);
            modules.push((name, Arc::from(module)));
        }

        info!(
            modules = modules.len(),
            "✅ BOOTSTRAP: Storage and feature modules initialized"
        );

        Ok(Self {
            config_manager,
            ledger,
            modules,
        })
    }

    pub fn ledger(&self) -> Arc<dyn WorkerLedger> {
        self.ledger.clone()
    }

    /// Configuration identifiers of the initialized feature modules
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Spawn every module's `start` concurrently.
    pub fn start(self) -> PoolHandle {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let states: Arc<DashMap<String, ModuleState>> = Arc::new(DashMap::new());

        for (name, module) in self.modules {
            let token = token.clone();
            let states = states.clone();
            states.insert(name.clone(), ModuleState::Running);
            log_capability_operation("start", &name, "running", None);

            tracker.spawn(async move {
                let state = match module.start(token.clone()).await {
                    Ok(()) => {
                        info!(module = %name, "Module stopped");
                        ModuleState::Stopped
                    }
                    Err(e) if token.is_cancelled() => {
                        info!(module = %name, error = %e, "Module stopped during shutdown");
                        ModuleState::Stopped
                    }
                    Err(e) => {
                        log_error(&name, "start", &e.to_string(), Some("module will not be restarted"));
                        ModuleState::Failed(e.to_string())
                    }
                };
                states.insert(name, state);
            });
        }

        info!("🎉 BOOTSTRAP: Pool started");
        PoolHandle {
            config_manager: self.config_manager,
            ledger: self.ledger,
            token,
            tracker,
            states,
        }
    }
}

/// Handle to a running pool
pub struct PoolHandle {
    config_manager: Arc<ConfigManager>,
    ledger: Arc<dyn WorkerLedger>,
    token: CancellationToken,
    tracker: TaskTracker,
    states: Arc<DashMap<String, ModuleState>>,
}

impl PoolHandle {
    pub fn ledger(&self) -> Arc<dyn WorkerLedger> {
        self.ledger.clone()
    }

    /// Token cancelled when shutdown begins
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.states.get(name).map(|s| s.clone())
    }

    pub fn status(&self) -> SystemStatus {
        let mut modules: Vec<(String, ModuleState)> = self
            .states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        modules.sort_by(|a, b| a.0.cmp(&b.0));

        SystemStatus {
            running: self.is_running(),
            environment: self.config_manager.environment().to_string(),
            storage_backend: self.ledger.backend_name().to_string(),
            modules,
        }
    }

    /// Run until `signal` resolves, then shut down.
    pub async fn run_until<F>(self, signal: F, timeout: Duration) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("🛑 Shutdown signal received");
        self.shutdown(timeout).await
    }

    /// Cancel every module and wait for them to return.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.token.cancel();
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            let pending: Vec<String> = self
                .states
                .iter()
                .filter(|entry| *entry.value() == ModuleState::Running)
                .map(|entry| entry.key().clone())
                .collect();
            warn!(?pending, "Shutdown timed out with modules still running");
            return Err(PoolError::capability(
                "host",
                format!("modules still running after {timeout:?}: {}", pending.join(", ")),
            ));
        }

        info!("✅ Pool shut down");
        Ok(())
    }
}
