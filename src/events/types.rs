//! Event record and payload shapes.
//!
//! JSON field names follow the producers' wire format, which mixes camelCase
//! and snake_case keys; every struct renames its fields explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::events;

/// Event record as delivered by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "ID")]
    pub id: i64,
    /// JSON-encoded [`EventEnvelope`].
    #[serde(rename = "Payload")]
    pub payload: String,
    #[serde(rename = "Version", default)]
    pub version: i64,
    #[serde(rename = "DT")]
    pub timestamp: DateTime<Utc>,
}

/// Outer two-field shape carried inside [`RawEvent::payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Decoded, immutable pool event.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEvent {
    pub id: i64,
    pub payload: String,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub parsed: EventPayload,
}

impl PoolEvent {
    pub fn event_type(&self) -> &str {
        self.parsed.event_type()
    }

    /// Fill a node type the payload omitted. Payloads that carry one keep it.
    pub fn with_default_node_type(mut self, node_type: &str) -> Self {
        let slot = match &mut self.parsed {
            EventPayload::WorkerConnected(worker) | EventPayload::WorkerDisconnected(worker) => {
                Some(&mut worker.node_type)
            }
            EventPayload::JobReceived(job) => Some(&mut job.node_type),
            EventPayload::JobProcessed(job) => Some(&mut job.node_type),
            _ => None,
        };
        if let Some(slot) = slot.filter(|slot| slot.is_empty()) {
            *slot = node_type.to_string();
        }
        self
    }
}

/// Discriminated event payload.
///
/// The variant is fully determined by the envelope's `event_type`; anything
/// outside the known set lands in [`EventPayload::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    OrchestratorReset(OrchestratorReset),
    WorkerConnected(RemoteWorker),
    WorkerDisconnected(RemoteWorker),
    JobReceived(JobReceived),
    JobProcessed(JobProcessed),
    Unknown { event_type: String, payload: Value },
}

impl EventPayload {
    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::OrchestratorReset(_) => events::ORCHESTRATOR_RESET,
            EventPayload::WorkerConnected(_) => events::WORKER_CONNECTED,
            EventPayload::WorkerDisconnected(_) => events::WORKER_DISCONNECTED,
            EventPayload::JobReceived(_) => events::JOB_RECEIVED,
            EventPayload::JobProcessed(_) => events::JOB_PROCESSED,
            EventPayload::Unknown { event_type, .. } => event_type,
        }
    }

    /// Request identifier for job events, used as their idempotency key.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            EventPayload::JobReceived(job) => Some(job.request_id.as_str()),
            EventPayload::JobProcessed(job) => job.request_id.as_deref(),
            _ => None,
        }
        .filter(|id| !id.is_empty())
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventPayload::Unknown { .. })
    }

    /// Re-encode into the envelope this payload was decoded from.
    pub fn to_envelope(&self) -> serde_json::Result<EventEnvelope> {
        let payload = match self {
            EventPayload::OrchestratorReset(reset) => serde_json::to_value(reset)?,
            EventPayload::WorkerConnected(worker) | EventPayload::WorkerDisconnected(worker) => {
                serde_json::to_value(worker)?
            }
            EventPayload::JobReceived(job) => serde_json::to_value(job)?,
            EventPayload::JobProcessed(job) => serde_json::to_value(job)?,
            EventPayload::Unknown { payload, .. } => payload.clone(),
        };

        Ok(EventEnvelope {
            event_type: self.event_type().to_string(),
            payload,
        })
    }

    /// Encode as the JSON string carried in [`RawEvent::payload`].
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_envelope()?)
    }
}

/// `orchestrator-reset` carries no data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorReset {}

/// `worker-connected` / `worker-disconnected` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWorker {
    #[serde(rename = "ethAddress", default)]
    pub eth_address: String,
    #[serde(rename = "nodeType", default)]
    pub node_type: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub endpoint_hash: String,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub pending_fees: i64,
    #[serde(default)]
    pub paid_fees: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// `job-received` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReceived {
    #[serde(rename = "ethAddress", default)]
    pub eth_address: String,
    #[serde(rename = "modelID", default)]
    pub model_id: String,
    #[serde(rename = "nodeType", default)]
    pub node_type: String,
    #[serde(default)]
    pub pipeline: String,
    #[serde(rename = "requestID", default)]
    pub request_id: String,
    #[serde(rename = "taskID", default)]
    pub task_id: i64,
}

/// `job-processed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProcessed {
    #[serde(rename = "computeUnits", default)]
    pub compute_units: i64,
    #[serde(rename = "nodeType", default)]
    pub node_type: String,
    #[serde(rename = "pricePerComputeUnit", default)]
    pub price_per_compute_unit: i64,
    #[serde(default)]
    pub fees: i64,
    #[serde(rename = "ethAddress", default, skip_serializing_if = "Option::is_none")]
    pub eth_address: Option<String>,
    #[serde(rename = "responseTime", default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<i64>,
    #[serde(rename = "requestID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}
