//! # In-Memory Ledger
//!
//! Process-local [`WorkerLedger`] backend.
//!
//! Worker records live in a `DashMap`; every mutation of a worker happens
//! while holding that key's entry guard, which gives per-key atomicity and
//! read-after-write consistency. Lock order is always worker entry first,
//! then the dedup set, payouts and event log. Nothing acquires a worker
//! entry while holding one of the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::effects::{self, EventEffect, WorkerChange};
use super::{
    batch_high_water, ApplyOutcome, ApplyReport, DedupKey, LedgerError, LedgerResult,
    LedgerSettings, SelectionPolicy, WorkerLedger,
};
use crate::events::PoolEvent;
use crate::models::{
    EventLogEntry, NewEventLogEntry, PayoutRecord, WorkerCriteria, WorkerKey, WorkerRecord,
};

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    settings: LedgerSettings,
    workers: DashMap<WorkerKey, WorkerRecord>,
    processed: DashSet<DedupKey>,
    cursors: DashMap<String, DateTime<Utc>>,
    payouts: RwLock<Vec<PayoutRecord>>,
    event_log: RwLock<Vec<EventLogEntry>>,
    next_payout_id: AtomicI64,
    next_log_id: AtomicI64,
    rotation: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    fn apply_one(&self, event: &PoolEvent, source_endpoint: &str) -> ApplyOutcome {
        let effect = match effects::plan(event, source_endpoint, &self.settings) {
            Ok(effect) => effect,
            Err(e) => return ApplyOutcome::Rejected(e),
        };
        let dedup = DedupKey::for_event(event, source_endpoint);

        let outcome = match effect {
            EventEffect::Worker { key, change } => {
                self.apply_worker_change(event.id, key, &change, dedup, source_endpoint)
            }
            EventEffect::ResetSource => {
                if !self.processed.insert(dedup) {
                    return ApplyOutcome::Duplicate;
                }
                let disconnected = self.disconnect_where(|w| w.endpoint_hash == source_endpoint);
                debug!(
                    source_endpoint = %source_endpoint,
                    disconnected = disconnected,
                    "Orchestrator reset applied"
                );
                ApplyOutcome::Applied
            }
            EventEffect::LogOnly => {
                if !self.processed.insert(dedup) {
                    return ApplyOutcome::Duplicate;
                }
                ApplyOutcome::Applied
            }
        };

        if outcome == ApplyOutcome::Applied {
            self.append_log(NewEventLogEntry::from_event(event, source_endpoint));
        }

        outcome
    }

    fn apply_worker_change(
        &self,
        event_id: i64,
        key: WorkerKey,
        change: &WorkerChange,
        dedup: DedupKey,
        source_endpoint: &str,
    ) -> ApplyOutcome {
        match self.workers.entry(key) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.endpoint_hash != source_endpoint {
                    return ApplyOutcome::Rejected(LedgerError::SourceMismatch {
                        event_id: Some(event_id),
                        worker: record.key(),
                        pinned_endpoint: record.endpoint_hash.clone(),
                        source_endpoint: source_endpoint.to_string(),
                    });
                }
                if self.processed.contains(&dedup) {
                    return ApplyOutcome::Duplicate;
                }

                let mut next = record.clone();
                if let Err(e) = change.apply_to(&mut next) {
                    return ApplyOutcome::Rejected(e);
                }
                if !self.processed.insert(dedup) {
                    return ApplyOutcome::Duplicate;
                }
                *record = next;
                ApplyOutcome::Applied
            }
            Entry::Vacant(vacant) => {
                if self.processed.contains(&dedup) {
                    return ApplyOutcome::Duplicate;
                }

                let mut record = WorkerRecord::new(vacant.key(), source_endpoint);
                if let Err(e) = change.apply_to(&mut record) {
                    return ApplyOutcome::Rejected(e);
                }
                if !self.processed.insert(dedup) {
                    return ApplyOutcome::Duplicate;
                }
                debug!(
                    worker = %vacant.key(),
                    source_endpoint = %source_endpoint,
                    "Worker first seen, pinning endpoint"
                );
                vacant.insert(record);
                ApplyOutcome::Applied
            }
        }
    }

    fn disconnect_where(&self, predicate: impl Fn(&WorkerRecord) -> bool) -> usize {
        let mut count = 0;
        for mut entry in self.workers.iter_mut() {
            let record = entry.value_mut();
            if predicate(record) {
                record.is_connected = false;
                record.touch();
                count += 1;
            }
        }
        count
    }

    fn append_log(&self, entry: NewEventLogEntry) {
        let id = self.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.event_log.write().push(EventLogEntry {
            id,
            event_type: entry.event_type,
            data: entry.data,
            created_at: Utc::now(),
            endpoint_hash: entry.endpoint_hash,
        });
    }

    fn advance_cursor(&self, source_endpoint: &str, timestamp: DateTime<Utc>) {
        self.cursors
            .entry(source_endpoint.to_string())
            .and_modify(|current| {
                if timestamp > *current {
                    *current = timestamp;
                }
            })
            .or_insert(timestamp);
    }
}

#[async_trait]
impl WorkerLedger for InMemoryLedger {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn apply(
        &self,
        events: &[PoolEvent],
        source_endpoint: &str,
    ) -> LedgerResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for event in events {
            let outcome = self.apply_one(event, source_endpoint);
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
            self.advance_cursor(source_endpoint, high_water);
        }
        Ok(report)
    }

    async fn last_event_timestamp(
        &self,
        source_endpoint: &str,
    ) -> LedgerResult<Option<DateTime<Utc>>> {
        Ok(self.cursors.get(source_endpoint).map(|ts| *ts))
    }

    async fn get_workers(&self) -> LedgerResult<Vec<WorkerRecord>> {
        Ok(self.workers.iter().map(|w| w.value().clone()).collect())
    }

    async fn get_preferred_workers(
        &self,
        criteria: &WorkerCriteria,
    ) -> LedgerResult<Vec<WorkerRecord>> {
        let candidates = self
            .workers
            .iter()
            .filter(|w| w.matches(&criteria.node_type, &criteria.region))
            .map(|w| w.value().clone())
            .collect();

        let rotation = self.rotation.fetch_add(1, Ordering::Relaxed);
        Ok(SelectionPolicy::from_criteria(&criteria.criteria).select(candidates, rotation))
    }

    async fn add_pending_fees(&self, worker: &WorkerKey, amount: i64) -> LedgerResult<()> {
        let mut record = self
            .workers
            .get_mut(worker)
            .ok_or_else(|| LedgerError::WorkerNotFound {
                worker: worker.clone(),
            })?;

        record.pending_fees = effects::credit(&record, amount)?;
        record.touch();
        Ok(())
    }

    async fn add_paid_fees(
        &self,
        worker: &WorkerKey,
        amount: i64,
        tx_hash: &str,
    ) -> LedgerResult<PayoutRecord> {
        let mut record = self
            .workers
            .get_mut(worker)
            .ok_or_else(|| LedgerError::WorkerNotFound {
                worker: worker.clone(),
            })?;

        let (pending, paid) = effects::settle(&record, amount)?;

        let payout = PayoutRecord {
            id: self.next_payout_id.fetch_add(1, Ordering::SeqCst) + 1,
            eth_address: worker.eth_address.clone(),
            tx_hash: tx_hash.to_string(),
            fees: amount,
            created_at: Utc::now(),
        };
        self.payouts.write().push(payout.clone());

        record.pending_fees = pending;
        record.paid_fees = paid;
        record.touch();

        Ok(payout)
    }

    async fn update_worker_status(&self, worker: &WorkerKey, online: bool) -> LedgerResult<()> {
        let mut record = self
            .workers
            .get_mut(worker)
            .ok_or_else(|| LedgerError::WorkerNotFound {
                worker: worker.clone(),
            })?;

        record.is_connected = online;
        record.touch();
        Ok(())
    }

    async fn reset_workers_online_status(
        &self,
        region: &str,
        node_type: &str,
    ) -> LedgerResult<usize> {
        Ok(self.disconnect_where(|w| w.matches(node_type, region)))
    }

    async fn payouts(&self, eth_address: &str) -> LedgerResult<Vec<PayoutRecord>> {
        Ok(self
            .payouts
            .read()
            .iter()
            .filter(|p| p.eth_address == eth_address)
            .cloned()
            .collect())
    }

    async fn event_log(&self, limit: usize) -> LedgerResult<Vec<EventLogEntry>> {
        Ok(self
            .event_log
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{decode_event, RawEvent};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn event(id: i64, envelope: Value) -> PoolEvent {
        decode_event(RawEvent {
            id,
            payload: envelope.to_string(),
            version: 1,
            timestamp: Utc::now(),
        })
        .unwrap()
    }

    fn connected(id: i64, address: &str) -> PoolEvent {
        event(
            id,
            json!({"event_type": "worker-connected", "payload": {
                "ethAddress": address, "nodeType": "transcoder", "region": "eu"
            }}),
        )
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(LedgerSettings {
            default_region: "eu".to_string(),
            commission_bps: 0,
        })
    }

    #[tokio::test]
    async fn test_first_sighting_pins_endpoint() {
        let ledger = ledger();
        let report = ledger.apply(&[connected(1, "0xa")], "e1").await.unwrap();
        assert_eq!(report.applied, 1);

        let workers = ledger.get_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].endpoint_hash, "e1");
        assert!(workers[0].is_connected);
    }

    #[tokio::test]
    async fn test_rejected_event_does_not_block_siblings() {
        let ledger = ledger();
        ledger.apply(&[connected(1, "0xa")], "e2").await.unwrap();

        let report = ledger
            .apply(&[connected(2, "0xa"), connected(3, "0xb")], "e1")
            .await
            .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].event_id, 2);
        assert!(matches!(
            report.rejected[0].error,
            LedgerError::SourceMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_orchestrator_reset_only_touches_own_source() {
        let ledger = ledger();
        ledger.apply(&[connected(1, "0xa")], "e1").await.unwrap();
        ledger.apply(&[connected(1, "0xb")], "e2").await.unwrap();

        let reset = event(2, json!({"event_type": "orchestrator-reset", "payload": {}}));
        ledger.apply(&[reset], "e1").await.unwrap();

        let workers = ledger.get_workers().await.unwrap();
        let a = workers.iter().find(|w| w.eth_address == "0xa").unwrap();
        let b = workers.iter().find(|w| w.eth_address == "0xb").unwrap();
        assert!(!a.is_connected);
        assert!(b.is_connected);
    }

    #[tokio::test]
    async fn test_unknown_events_are_logged_without_mutation() {
        let ledger = ledger();
        let unknown = event(9, json!({"event_type": "gpu-temperature", "payload": {"c": 80}}));

        let report = ledger.apply(&[unknown.clone()], "e1").await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(ledger.get_workers().await.unwrap().is_empty());

        let log = ledger.event_log(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event_type, "gpu-temperature");
        assert_eq!(log[0].endpoint_hash, "e1");

        let replay = ledger.apply(&[unknown], "e1").await.unwrap();
        assert_eq!(replay.duplicates, 1);
        assert_eq!(ledger.event_log(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_tracks_newest_timestamp_per_source() {
        let ledger = ledger();
        assert!(ledger.last_event_timestamp("e1").await.unwrap().is_none());

        let mut older = connected(1, "0xa");
        older.timestamp = Utc::now() - chrono::Duration::minutes(5);
        let newer = connected(2, "0xb");
        let newest_ts = newer.timestamp;

        ledger.apply(&[newer, older], "e1").await.unwrap();
        assert_eq!(
            ledger.last_event_timestamp("e1").await.unwrap(),
            Some(newest_ts)
        );
        assert!(ledger.last_event_timestamp("e2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_direct_mutators_require_existing_worker() {
        let ledger = ledger();
        let key = WorkerKey::new("0xmissing", "transcoder", "eu");

        assert!(matches!(
            ledger.add_pending_fees(&key, 1).await,
            Err(LedgerError::WorkerNotFound { .. })
        ));
        assert!(matches!(
            ledger.update_worker_status(&key, true).await,
            Err(LedgerError::WorkerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_payout_leaves_balances_unchanged() {
        let ledger = ledger();
        ledger.apply(&[connected(1, "0xa")], "e1").await.unwrap();
        let key = WorkerKey::new("0xa", "transcoder", "eu");
        ledger.add_pending_fees(&key, 500).await.unwrap();

        let err = ledger.add_paid_fees(&key, 501, "0xtx").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPendingFees { .. }));

        let worker = ledger.get_workers().await.unwrap().remove(0);
        assert_eq!(worker.pending_fees, 500);
        assert_eq!(worker.paid_fees, 0);
        assert!(ledger.payouts("0xa").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_workers_online_status_filters() {
        let ledger = ledger();
        ledger
            .apply(&[connected(1, "0xa"), connected(2, "0xb")], "e1")
            .await
            .unwrap();

        assert_eq!(
            ledger
                .reset_workers_online_status("us", "transcoder")
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            ledger
                .reset_workers_online_status("eu", "transcoder")
                .await
                .unwrap(),
            2
        );
        assert!(ledger
            .get_workers()
            .await
            .unwrap()
            .iter()
            .all(|w| !w.is_connected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_apply_counts_once() {
        let ledger = Arc::new(ledger());
        ledger.apply(&[connected(1, "0xa")], "e1").await.unwrap();

        let job = event(
            2,
            json!({"event_type": "job-processed", "payload": {
                "ethAddress": "0xa", "nodeType": "transcoder", "fees": 100, "requestID": "r-1"
            }}),
        );

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let job = job.clone();
            handles.push(tokio::spawn(async move {
                ledger.apply(&[job], "e1").await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            applied += handle.await.unwrap().applied;
        }

        assert_eq!(applied, 1);
        let worker = ledger.get_workers().await.unwrap().remove(0);
        assert_eq!(worker.pending_fees, 100);
    }
}
