//! Ledger reporter: periodic read-only summary of ledger totals.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{initialized, Capability};
use crate::config::PoolConfig;
use crate::constants::modules;
use crate::error::{PoolError, Result};
use crate::ledger::WorkerLedger;
use crate::logging::log_error;

/// Point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub workers: usize,
    pub connected: usize,
    pub pending_eth: f64,
    pub paid_eth: f64,
}

pub struct LedgerReporter {
    interval: Duration,
    ledger: Option<Arc<dyn WorkerLedger>>,
}

impl Default for LedgerReporter {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            ledger: None,
        }
    }
}

impl LedgerReporter {
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let ledger = initialized(self.name(), &self.ledger)?;
        let workers = ledger.get_workers().await?;

        Ok(LedgerSnapshot {
            workers: workers.len(),
            connected: workers.iter().filter(|w| w.is_connected).count(),
            pending_eth: ledger.get_pending_fees().await?,
            paid_eth: ledger.get_paid_fees().await?,
        })
    }
}

#[async_trait]
impl Capability for LedgerReporter {
    fn name(&self) -> &str {
        modules::LEDGER_REPORTER
    }

    async fn init(&mut self, config: &PoolConfig, ledger: Arc<dyn WorkerLedger>) -> Result<()> {
        if let Some(section) = &config.reporter {
            self.interval = Duration::from_secs(section.interval_seconds);
        }
        self.ledger = Some(ledger);
        Ok(())
    }

    async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => match self.snapshot().await {
                    Ok(snapshot) => info!(
                        workers = snapshot.workers,
                        connected = snapshot.connected,
                        pending_eth = snapshot.pending_eth,
                        paid_eth = snapshot.paid_eth,
                        "📊 LEDGER_REPORT"
                    ),
                    Err(PoolError::Ledger(e)) => {
                        log_error(modules::LEDGER_REPORTER, "snapshot", &e.to_string(), None)
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        Ok(())
    }
}
