//! Event builders shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use openpool_core::events::{decode_event, PoolEvent, RawEvent};
use openpool_core::ledger::{InMemoryLedger, LedgerSettings};
use serde_json::{json, Value};

/// Region assigned to workers whose events carry none
pub const TEST_REGION: &str = "eu";

pub fn test_settings() -> LedgerSettings {
    LedgerSettings {
        default_region: TEST_REGION.to_string(),
        commission_bps: 0,
    }
}

pub fn test_ledger() -> InMemoryLedger {
    InMemoryLedger::new(test_settings())
}

/// Fixed base time so cursors are deterministic
pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Raw record with `id`, version 1 and a timestamp `id` seconds after [`base_time`]
pub fn raw(id: i64, envelope: Value) -> RawEvent {
    RawEvent {
        id,
        payload: envelope.to_string(),
        version: 1,
        timestamp: base_time() + Duration::seconds(id),
    }
}

pub fn decoded(id: i64, envelope: Value) -> PoolEvent {
    decode_event(raw(id, envelope)).expect("test event should decode")
}

pub fn worker_connected(eth_address: &str, node_type: &str) -> Value {
    json!({
        "event_type": "worker-connected",
        "payload": {
            "ethAddress": eth_address,
            "nodeType": node_type,
            "region": TEST_REGION,
        }
    })
}

pub fn worker_disconnected(eth_address: &str, node_type: &str) -> Value {
    json!({
        "event_type": "worker-disconnected",
        "payload": {
            "ethAddress": eth_address,
            "nodeType": node_type,
            "region": TEST_REGION,
        }
    })
}

pub fn job_processed(eth_address: &str, node_type: &str, request_id: &str, fees: i64) -> Value {
    json!({
        "event_type": "job-processed",
        "payload": {
            "ethAddress": eth_address,
            "nodeType": node_type,
            "requestID": request_id,
            "computeUnits": 1,
            "pricePerComputeUnit": fees,
            "fees": fees,
        }
    })
}

pub fn orchestrator_reset() -> Value {
    json!({"event_type": "orchestrator-reset", "payload": {}})
}
