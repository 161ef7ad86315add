//! # Payout Loop
//!
//! Periodically pays every worker whose pending fees reached the configured
//! threshold, then records the payout in the ledger. Transfers go through a
//! [`PayoutSender`]; transaction signing lives outside this crate, and the
//! built-in [`DryRunPayoutSender`] only fabricates transaction hashes.
//!
//! Workers are keyed per node type and region, so one address may be paid
//! once per key in a round.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{initialized, Capability};
use crate::config::{ConfigurationError, PoolConfig};
use crate::constants::modules;
use crate::constants::units::wei_to_eth;
use crate::error::{PoolError, Result};
use crate::ledger::WorkerLedger;
use crate::logging::{log_error, log_ledger_operation};

/// Submits a transfer and returns its transaction hash
#[async_trait]
pub trait PayoutSender: Send + Sync + fmt::Debug {
    async fn send(&self, eth_address: &str, amount: i64) -> Result<String>;
}

/// Sender that submits nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPayoutSender;

#[async_trait]
impl PayoutSender for DryRunPayoutSender {
    async fn send(&self, eth_address: &str, amount: i64) -> Result<String> {
        let tx_hash = format!("dry-run-{}", Uuid::new_v4().simple());
        info!(
            eth_address = %eth_address,
            amount = amount,
            tx_hash = %tx_hash,
            "💸 PAYOUT: Dry-run transfer"
        );
        Ok(tx_hash)
    }
}

/// Outcome of one payout round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutRound {
    pub paid: usize,
    pub total_paid: i64,
    pub failed: usize,
}

pub struct PayoutLoop {
    sender: Option<Arc<dyn PayoutSender>>,
    threshold: i64,
    frequency: Duration,
    ledger: Option<Arc<dyn WorkerLedger>>,
}

impl Default for PayoutLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutLoop {
    /// Payout loop that can only run with `dry_run` enabled
    pub fn new() -> Self {
        Self {
            sender: None,
            threshold: i64::MAX,
            frequency: Duration::from_secs(3600),
            ledger: None,
        }
    }

    /// Payout loop submitting transfers through `sender`
    pub fn with_sender(sender: Arc<dyn PayoutSender>) -> Self {
        Self {
            sender: Some(sender),
            ..Self::new()
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Pay every worker at or above the threshold.
    ///
    /// A failed transfer or ledger update skips that worker only.
    pub async fn run_once(&self) -> Result<PayoutRound> {
        let ledger = initialized(self.name(), &self.ledger)?;
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| PoolError::capability(self.name(), "no payout sender"))?;

        let mut round = PayoutRound::default();
        let due = ledger
            .get_workers()
            .await?
            .into_iter()
            .filter(|w| w.pending_fees >= self.threshold && w.pending_fees > 0);

        for worker in due {
            let key = worker.key();
            let amount = worker.pending_fees;

            let tx_hash = match sender.send(&worker.eth_address, amount).await {
                Ok(tx_hash) => tx_hash,
                Err(e) => {
                    round.failed += 1;
                    warn!(worker = %key, amount = amount, error = %e, "Payout transfer failed");
                    continue;
                }
            };

            match ledger.add_paid_fees(&key, amount, &tx_hash).await {
                Ok(payout) => {
                    round.paid += 1;
                    round.total_paid += payout.fees;
                    log_ledger_operation(
                        "add_paid_fees",
                        ledger.backend_name(),
                        None,
                        Some(&key.to_string()),
                        "paid",
                        Some(&tx_hash),
                    );
                }
                Err(e) => {
                    round.failed += 1;
                    log_error(
                        modules::PAYOUT_LOOP,
                        "add_paid_fees",
                        &e.to_string(),
                        Some(&format!("transfer {tx_hash} sent but not recorded")),
                    );
                }
            }
        }

        Ok(round)
    }
}

#[async_trait]
impl Capability for PayoutLoop {
    fn name(&self) -> &str {
        modules::PAYOUT_LOOP
    }

    async fn init(&mut self, config: &PoolConfig, ledger: Arc<dyn WorkerLedger>) -> Result<()> {
        let section = config.payout_loop.as_ref().ok_or_else(|| {
            ConfigurationError::missing_required_field("payout_loop", "payout-loop module")
        })?;

        self.threshold = section.threshold_wei()?;
        self.frequency = section.payout_frequency();

        if section.dry_run {
            self.sender = Some(Arc::new(DryRunPayoutSender));
        } else if self.sender.is_none() {
            return Err(ConfigurationError::invalid_value(
                "payout_loop.dry_run",
                "false",
                "no payout sender registered; enable dry_run or supply a sender",
            )
            .into());
        }

        self.ledger = Some(ledger);
        Ok(())
    }

    async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            threshold = self.threshold,
            frequency_secs = self.frequency.as_secs(),
            "💸 PAYOUT: Loop started"
        );
        let mut interval = tokio::time::interval(self.frequency);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(round) if round.paid > 0 || round.failed > 0 => info!(
                            paid = round.paid,
                            failed = round.failed,
                            total_eth = wei_to_eth(i128::from(round.total_paid)),
                            "💸 PAYOUT: Round complete"
                        ),
                        Ok(_) => {}
                        Err(PoolError::Ledger(e)) => {
                            log_error(modules::PAYOUT_LOOP, "run_once", &e.to_string(), None)
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        info!("💸 PAYOUT: Loop stopped");
        Ok(())
    }
}
