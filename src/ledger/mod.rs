//! # Worker Ledger
//!
//! The durable per-worker fee and connectivity state shared by every
//! capability module.
//!
//! ## Contract
//!
//! - **Provenance**: a worker is pinned to the source endpoint that first
//!   reported it. Events from any other endpoint are rejected for that worker
//!   with [`LedgerError::SourceMismatch`] and leave it untouched.
//! - **Idempotency**: replaying an event is a no-op; see [`DedupKey`].
//! - **Per-key atomicity**: mutations of one worker's balance fields never
//!   interleave. There is no ordering guarantee across keys.
//! - **Integer balances**: all amounts are smallest units; the unit of account
//!   only appears in [`WorkerLedger::get_pending_fees`] and
//!   [`WorkerLedger::get_paid_fees`].
//!
//! No operation defines an internal timeout. Callers own retry and backoff
//! and must reuse the same source endpoint when replaying a batch.
//!
//! ## Backends
//!
//! - [`InMemoryLedger`]: `DashMap` entry locks per worker key
//! - [`PgLedger`]: one transaction per event with a row lock on the worker

pub mod effects;
pub mod error;
pub mod idempotency;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod selection;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::config::PoolConfig;
use crate::constants::units::wei_to_eth;
use crate::events::PoolEvent;
use crate::models::{EventLogEntry, PayoutRecord, WorkerCriteria, WorkerKey, WorkerRecord};

pub use effects::{EventEffect, WorkerChange};
pub use error::{LedgerError, LedgerResult};
pub use idempotency::DedupKey;
pub use memory::InMemoryLedger;
#[cfg(feature = "postgres")]
pub use postgres::PgLedger;
pub use selection::{SelectionPolicy, SelectionStrategy};

/// Settings every backend needs to turn events into mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Region assigned to workers whose events carry none.
    pub default_region: String,
    /// Pool commission on job fees, in basis points.
    pub commission_bps: i64,
}

impl LedgerSettings {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            default_region: config.region.clone(),
            commission_bps: config.commission_bps(),
        }
    }
}

/// Outcome of applying a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Duplicate,
    Rejected(LedgerError),
}

/// Event that was dropped from a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEvent {
    pub event_id: i64,
    pub event_type: String,
    pub error: LedgerError,
}

/// Summary of one [`WorkerLedger::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedEvent>,
}

impl ApplyReport {
    pub fn record(&mut self, event: &PoolEvent, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Duplicate => self.duplicates += 1,
            ApplyOutcome::Rejected(error) => self.rejected.push(RejectedEvent {
                event_id: event.id,
                event_type: event.event_type().to_string(),
                error,
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.duplicates + self.rejected.len()
    }
}

/// Newest timestamp in a batch; the value a source cursor moves to once the
/// whole batch has been applied.
pub fn batch_high_water(events: &[PoolEvent]) -> Option<DateTime<Utc>> {
    events.iter().map(|event| event.timestamp).max()
}

/// Storage contract for the worker ledger.
///
/// One instance is shared by every capability module; all methods may be
/// called concurrently.
#[async_trait]
pub trait WorkerLedger: Send + Sync + fmt::Debug {
    /// Backend identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Apply a batch of events from one source endpoint.
    ///
    /// Rejected events are reported and do not block their siblings. A
    /// storage failure aborts the call; events committed before it stay
    /// committed and a replay with the same `source_endpoint` is safe.
    ///
    /// The source cursor moves to [`batch_high_water`] only after every event
    /// in the batch has been applied, so an aborted batch leaves it where the
    /// last complete batch put it.
    async fn apply(&self, events: &[PoolEvent], source_endpoint: &str)
        -> LedgerResult<ApplyReport>;

    /// Timestamp of the newest event in the last fully applied batch from
    /// `source_endpoint`.
    async fn last_event_timestamp(&self, source_endpoint: &str)
        -> LedgerResult<Option<DateTime<Utc>>>;

    async fn get_workers(&self) -> LedgerResult<Vec<WorkerRecord>>;

    /// Workers matching the criteria's node type and region exactly.
    ///
    /// Result ordering is unspecified.
    async fn get_preferred_workers(&self, criteria: &WorkerCriteria)
        -> LedgerResult<Vec<WorkerRecord>>;

    async fn add_pending_fees(&self, worker: &WorkerKey, amount: i64) -> LedgerResult<()>;

    /// Move `amount` from pending to paid and record the payout.
    async fn add_paid_fees(
        &self,
        worker: &WorkerKey,
        amount: i64,
        tx_hash: &str,
    ) -> LedgerResult<PayoutRecord>;

    async fn update_worker_status(&self, worker: &WorkerKey, online: bool) -> LedgerResult<()>;

    /// Mark every worker in `region` with `node_type` offline; returns how many.
    async fn reset_workers_online_status(&self, region: &str, node_type: &str)
        -> LedgerResult<usize>;

    /// Total pending fees in the unit of account.
    async fn get_pending_fees(&self) -> LedgerResult<f64> {
        let workers = self.get_workers().await?;
        Ok(wei_to_eth(
            workers.iter().map(|w| i128::from(w.pending_fees)).sum(),
        ))
    }

    /// Total paid fees in the unit of account.
    async fn get_paid_fees(&self) -> LedgerResult<f64> {
        let workers = self.get_workers().await?;
        Ok(wei_to_eth(
            workers.iter().map(|w| i128::from(w.paid_fees)).sum(),
        ))
    }

    async fn payouts(&self, eth_address: &str) -> LedgerResult<Vec<PayoutRecord>>;

    /// Most recent event log entries, newest first.
    async fn event_log(&self, limit: usize) -> LedgerResult<Vec<EventLogEntry>>;
}
