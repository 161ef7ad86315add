//! # Capability Modules
//!
//! Independently scheduled units of pool functionality. The host resolves a
//! [`StorageModule`] first, then hands the ledger it produced to every
//! feature [`Capability`] during `init`, and finally spawns each module's
//! `start` on its own task.
//!
//! ## Lifecycle
//!
//! 1. `init` runs sequentially, before anything starts. A failure here aborts
//!    bootstrap.
//! 2. `start` runs concurrently with every other module. It should return
//!    promptly once the shutdown token is cancelled. A module whose `start`
//!    returns an error is logged and left stopped.
//!
//! Modules may observe an empty ledger when they start; there is no
//! happens-before relationship between different modules.

pub mod data_loader;
pub mod event_source;
pub mod payout_loop;
pub mod reporter;
pub mod storage;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::ledger::WorkerLedger;

pub use data_loader::{DataLoader, LoaderTick};
pub use event_source::{endpoint_id, ChannelEventSource, EventSource, FileEventSource};
pub use payout_loop::{DryRunPayoutSender, PayoutLoop, PayoutRound, PayoutSender};
pub use reporter::{LedgerReporter, LedgerSnapshot};
pub use storage::{MemoryStorage, StorageModule};
#[cfg(feature = "postgres")]
pub use storage::PostgresStorage;

/// A feature module hosted by the pool
#[async_trait]
pub trait Capability: Send + Sync {
    /// Module identifier used in configuration and logs
    fn name(&self) -> &str;

    /// Prepare the module with its configuration and the shared ledger
    async fn init(&mut self, config: &PoolConfig, ledger: Arc<dyn WorkerLedger>) -> Result<()>;

    /// Run until `shutdown` is cancelled or the module finishes its work
    async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// Ledger handle stored by a module during `init`
pub(crate) fn initialized(
    name: &str,
    ledger: &Option<Arc<dyn WorkerLedger>>,
) -> Result<Arc<dyn WorkerLedger>> {
    ledger
        .clone()
        .ok_or_else(|| PoolError::capability(name, "started before init"))
}
