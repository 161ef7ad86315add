//! Storage modules: factories for the shared [`WorkerLedger`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::constants::modules;
use crate::error::Result;
use crate::ledger::{InMemoryLedger, LedgerSettings, WorkerLedger};

/// Provides the ledger every feature module shares
#[async_trait]
pub trait StorageModule: Send + Sync {
    fn name(&self) -> &str;

    /// Build a fully initialized ledger
    async fn init(&self, config: &PoolConfig) -> Result<Arc<dyn WorkerLedger>>;
}

/// Process-local storage; state is lost on restart
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStorage;

#[async_trait]
impl StorageModule for MemoryStorage {
    fn name(&self) -> &str {
        modules::STORAGE_MEMORY
    }

    async fn init(&self, config: &PoolConfig) -> Result<Arc<dyn WorkerLedger>> {
        Ok(Arc::new(InMemoryLedger::new(LedgerSettings::from_config(
            config,
        ))))
    }
}

/// PostgreSQL storage configured by the `database` section
#[cfg(feature = "postgres")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresStorage;

#[cfg(feature = "postgres")]
#[async_trait]
impl StorageModule for PostgresStorage {
    fn name(&self) -> &str {
        modules::STORAGE_POSTGRES
    }

    async fn init(&self, config: &PoolConfig) -> Result<Arc<dyn WorkerLedger>> {
        use crate::config::ConfigurationError;
        use crate::ledger::PgLedger;

        let database = config.database.as_ref().ok_or_else(|| {
            ConfigurationError::missing_required_field("database", "postgres storage module")
        })?;
        let ledger = PgLedger::connect(database, LedgerSettings::from_config(config)).await?;
        Ok(Arc::new(ledger))
    }
}
