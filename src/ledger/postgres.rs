//! # PostgreSQL Ledger
//!
//! Durable [`WorkerLedger`] backend. Each event is applied in its own
//! transaction: the worker row is created if absent and then locked with
//! `SELECT ... FOR UPDATE`, the dedup key is claimed in `processed_events`,
//! and the new balances plus the event log entry are written before commit.
//! A rejected or duplicate event rolls its transaction back.
//!
//! Schema lives in `migrations/` and is applied by [`PgLedger::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, instrument, warn};

use super::effects::{self, EventEffect, WorkerChange};
use super::{
    batch_high_water, ApplyOutcome, ApplyReport, DedupKey, LedgerError, LedgerResult,
    LedgerSettings, SelectionPolicy, WorkerLedger,
};
use crate::config::DatabaseConfig;
use crate::constants::units::wei_to_eth;
use crate::events::PoolEvent;
use crate::models::{
    EventLogEntry, NewEventLogEntry, PayoutRecord, WorkerCriteria, WorkerKey, WorkerRecord,
};

const WORKER_COLUMNS: &str = "eth_address, node_type, region, endpoint_hash, is_connected, \
     pending_fees, paid_fees, last_updated, connection";

fn storage(operation: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |e| LedgerError::storage(operation, e)
}

#[derive(Debug)]
pub struct PgLedger {
    pool: PgPool,
    settings: LedgerSettings,
    rotation: AtomicUsize,
}

impl PgLedger {
    pub fn new(pool: PgPool, settings: LedgerSettings) -> Self {
        Self {
            pool,
            settings,
            rotation: AtomicUsize::new(0),
        }
    }

    /// Connect using the configured database and apply pending migrations.
    pub async fn connect(config: &DatabaseConfig, settings: LedgerSettings) -> LedgerResult<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting PostgreSQL ledger"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(storage("connect"))?;

        let ledger = Self::new(pool, settings);
        ledger.migrate().await?;
        Ok(ledger)
    }

    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::storage("migrate", e))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn apply_one(
        &self,
        event: &PoolEvent,
        source_endpoint: &str,
    ) -> LedgerResult<ApplyOutcome> {
        let effect = match effects::plan(event, source_endpoint, &self.settings) {
            Ok(effect) => effect,
            Err(e) => return Ok(ApplyOutcome::Rejected(e)),
        };
        let dedup = DedupKey::for_event(event, source_endpoint);

        let mut tx = self.pool.begin().await.map_err(storage("apply"))?;

        let outcome = match effect {
            EventEffect::Worker { key, change } => {
                Self::apply_worker_change(&mut tx, event.id, &key, &change, &dedup, source_endpoint)
                    .await?
            }
            EventEffect::ResetSource => {
                if !Self::claim(&mut tx, &dedup).await? {
                    ApplyOutcome::Duplicate
                } else {
                    let disconnected = sqlx::query(
                        "UPDATE workers SET is_connected = FALSE, last_updated = NOW() \
                         WHERE endpoint_hash = $1",
                    )
                    .bind(source_endpoint)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage("apply"))?
                    .rows_affected();
                    debug!(
                        source_endpoint = %source_endpoint,
                        disconnected = disconnected,
                        "Orchestrator reset applied"
                    );
                    ApplyOutcome::Applied
                }
            }
            EventEffect::LogOnly => {
                if Self::claim(&mut tx, &dedup).await? {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Duplicate
                }
            }
        };

        if outcome != ApplyOutcome::Applied {
            tx.rollback().await.map_err(storage("apply"))?;
            return Ok(outcome);
        }

        let entry = NewEventLogEntry::from_event(event, source_endpoint);
        sqlx::query("INSERT INTO event_log (event_type, data, endpoint_hash) VALUES ($1, $2, $3)")
            .bind(&entry.event_type)
            .bind(&entry.data)
            .bind(&entry.endpoint_hash)
            .execute(&mut *tx)
            .await
            .map_err(storage("apply"))?;

        tx.commit().await.map_err(storage("apply"))?;
        Ok(ApplyOutcome::Applied)
    }

    async fn apply_worker_change(
        tx: &mut Transaction<'_, Postgres>,
        event_id: i64,
        key: &WorkerKey,
        change: &WorkerChange,
        dedup: &DedupKey,
        source_endpoint: &str,
    ) -> LedgerResult<ApplyOutcome> {
        // Create-if-absent pins a new worker to this source; the row lock
        // below then serializes every writer of the key.
        sqlx::query(
            "INSERT INTO workers (eth_address, node_type, region, endpoint_hash) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(&key.eth_address)
        .bind(&key.node_type)
        .bind(&key.region)
        .bind(source_endpoint)
        .execute(&mut **tx)
        .await
        .map_err(storage("apply"))?;

        let mut record = Self::lock_worker(tx, key)
            .await?
            .ok_or_else(|| LedgerError::storage("apply", format!("worker {key} vanished")))?;

        if record.endpoint_hash != source_endpoint {
            return Ok(ApplyOutcome::Rejected(LedgerError::SourceMismatch {
                event_id: Some(event_id),
                worker: key.clone(),
                pinned_endpoint: record.endpoint_hash,
                source_endpoint: source_endpoint.to_string(),
            }));
        }
        if !Self::claim(tx, dedup).await? {
            return Ok(ApplyOutcome::Duplicate);
        }
        if let Err(e) = change.apply_to(&mut record) {
            return Ok(ApplyOutcome::Rejected(e));
        }

        Self::store_worker(tx, &record).await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn lock_worker(
        tx: &mut Transaction<'_, Postgres>,
        key: &WorkerKey,
    ) -> LedgerResult<Option<WorkerRecord>> {
        sqlx::query_as::<_, WorkerRecord>(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers \
             WHERE eth_address = $1 AND node_type = $2 AND region = $3 FOR UPDATE"
        ))
        .bind(&key.eth_address)
        .bind(&key.node_type)
        .bind(&key.region)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage("lock_worker"))
    }

    async fn store_worker(
        tx: &mut Transaction<'_, Postgres>,
        record: &WorkerRecord,
    ) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE workers SET is_connected = $4, pending_fees = $5, paid_fees = $6, \
             last_updated = $7, connection = $8 \
             WHERE eth_address = $1 AND node_type = $2 AND region = $3",
        )
        .bind(&record.eth_address)
        .bind(&record.node_type)
        .bind(&record.region)
        .bind(record.is_connected)
        .bind(record.pending_fees)
        .bind(record.paid_fees)
        .bind(record.last_updated)
        .bind(&record.connection)
        .execute(&mut **tx)
        .await
        .map_err(storage("store_worker"))?;
        Ok(())
    }

    /// Claim a dedup key; false if it was already processed.
    async fn claim(tx: &mut Transaction<'_, Postgres>, dedup: &DedupKey) -> LedgerResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO processed_events (dedup_key) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(dedup.to_string())
        .execute(&mut **tx)
        .await
        .map_err(storage("claim"))?
        .rows_affected();
        Ok(inserted == 1)
    }

    async fn advance_cursor(
        &self,
        source_endpoint: &str,
        timestamp: DateTime<Utc>,
    ) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO source_cursors (endpoint_hash, last_event_at) VALUES ($1, $2) \
             ON CONFLICT (endpoint_hash) DO UPDATE \
             SET last_event_at = GREATEST(source_cursors.last_event_at, EXCLUDED.last_event_at)",
        )
        .bind(source_endpoint)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage("advance_cursor"))?;
        Ok(())
    }

    /// Lock a worker in a fresh transaction, failing if it does not exist.
    async fn begin_for_worker(
        &self,
        worker: &WorkerKey,
        operation: &'static str,
    ) -> LedgerResult<(Transaction<'_, Postgres>, WorkerRecord)> {
        let mut tx = self.pool.begin().await.map_err(storage(operation))?;
        let record =
            Self::lock_worker(&mut tx, worker)
                .await?
                .ok_or_else(|| LedgerError::WorkerNotFound {
                    worker: worker.clone(),
                })?;
        Ok((tx, record))
    }

    async fn sum_column(&self, column: &'static str) -> LedgerResult<f64> {
        // SUM over BIGINT yields NUMERIC; read it as text to keep full precision.
        let total: String = sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM({column}), 0)::TEXT FROM workers"
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(storage("sum_fees"))?;

        total
            .parse::<i128>()
            .map(wei_to_eth)
            .map_err(|e| LedgerError::storage("sum_fees", e))
    }
}

#[async_trait]
impl WorkerLedger for PgLedger {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, events), fields(batch_size = events.len()))]
    async fn apply(
        &self,
        events: &[PoolEvent],
        source_endpoint: &str,
    ) -> LedgerResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for event in events {
            let outcome = self.apply_one(event, source_endpoint).await?;
            if let ApplyOutcome::Rejected(e) = &outcome {
                warn!(
                    event_id = event.id,
                    event_type = %event.event_type(),
                    source_endpoint = %source_endpoint,
                    error = %e,
                    "Event rejected"
                );
            }
            report.record(event, outcome);
        }

        if let Some(high_water) = batch_high_water(events) {
            self.advance_cursor(source_endpoint, high_water).await?;
        }
        Ok(report)
    }

    async fn last_event_timestamp(
        &self,
        source_endpoint: &str,
    ) -> LedgerResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT last_event_at FROM source_cursors WHERE endpoint_hash = $1")
            .bind(source_endpoint)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("last_event_timestamp"))
    }

    async fn get_workers(&self) -> LedgerResult<Vec<WorkerRecord>> {
        sqlx::query_as::<_, WorkerRecord>(&format!("SELECT {WORKER_COLUMNS} FROM workers"))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("get_workers"))
    }

    async fn get_preferred_workers(
        &self,
        criteria: &WorkerCriteria,
    ) -> LedgerResult<Vec<WorkerRecord>> {
        let candidates = sqlx::query_as::<_, WorkerRecord>(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE node_type = $1 AND region = $2"
        ))
        .bind(&criteria.node_type)
        .bind(&criteria.region)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("get_preferred_workers"))?;

        let rotation = self.rotation.fetch_add(1, Ordering::Relaxed);
        Ok(SelectionPolicy::from_criteria(&criteria.criteria).select(candidates, rotation))
    }

    async fn add_pending_fees(&self, worker: &WorkerKey, amount: i64) -> LedgerResult<()> {
        let (mut tx, mut record) = self.begin_for_worker(worker, "add_pending_fees").await?;

        record.pending_fees = effects::credit(&record, amount)?;
        record.touch();
        Self::store_worker(&mut tx, &record).await?;

        tx.commit().await.map_err(storage("add_pending_fees"))
    }

    async fn add_paid_fees(
        &self,
        worker: &WorkerKey,
        amount: i64,
        tx_hash: &str,
    ) -> LedgerResult<PayoutRecord> {
        let (mut tx, mut record) = self.begin_for_worker(worker, "add_paid_fees").await?;

        let (pending, paid) = effects::settle(&record, amount)?;
        record.pending_fees = pending;
        record.paid_fees = paid;
        record.touch();
        Self::store_worker(&mut tx, &record).await?;

        let payout = sqlx::query_as::<_, PayoutRecord>(
            "INSERT INTO payouts (eth_address, tx_hash, fees) VALUES ($1, $2, $3) \
             RETURNING id, eth_address, tx_hash, fees, created_at",
        )
        .bind(&worker.eth_address)
        .bind(tx_hash)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("add_paid_fees"))?;

        tx.commit().await.map_err(storage("add_paid_fees"))?;
        Ok(payout)
    }

    async fn update_worker_status(&self, worker: &WorkerKey, online: bool) -> LedgerResult<()> {
        let updated = sqlx::query(
            "UPDATE workers SET is_connected = $4, last_updated = NOW() \
             WHERE eth_address = $1 AND node_type = $2 AND region = $3",
        )
        .bind(&worker.eth_address)
        .bind(&worker.node_type)
        .bind(&worker.region)
        .bind(online)
        .execute(&self.pool)
        .await
        .map_err(storage("update_worker_status"))?
        .rows_affected();

        if updated == 0 {
            return Err(LedgerError::WorkerNotFound {
                worker: worker.clone(),
            });
        }
        Ok(())
    }

    async fn reset_workers_online_status(
        &self,
        region: &str,
        node_type: &str,
    ) -> LedgerResult<usize> {
        let updated = sqlx::query(
            "UPDATE workers SET is_connected = FALSE, last_updated = NOW() \
             WHERE region = $1 AND node_type = $2",
        )
        .bind(region)
        .bind(node_type)
        .execute(&self.pool)
        .await
        .map_err(storage("reset_workers_online_status"))?
        .rows_affected();

        Ok(updated as usize)
    }

    async fn get_pending_fees(&self) -> LedgerResult<f64> {
        self.sum_column("pending_fees").await
    }

    async fn get_paid_fees(&self) -> LedgerResult<f64> {
        self.sum_column("paid_fees").await
    }

    async fn payouts(&self, eth_address: &str) -> LedgerResult<Vec<PayoutRecord>> {
        sqlx::query_as::<_, PayoutRecord>(
            "SELECT id, eth_address, tx_hash, fees, created_at FROM payouts \
             WHERE eth_address = $1 ORDER BY id",
        )
        .bind(eth_address)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("payouts"))
    }

    async fn event_log(&self, limit: usize) -> LedgerResult<Vec<EventLogEntry>> {
        sqlx::query_as::<_, EventLogEntry>(
            "SELECT id, event_type, data, created_at, endpoint_hash FROM event_log \
             ORDER BY id DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("event_log"))
    }
}
