use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::PoolEvent;

/// Audit trail entry for an applied event. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct EventLogEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub endpoint_hash: String,
}

/// Event log entry to be appended (without generated fields)
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventLogEntry {
    pub event_type: String,
    pub data: String,
    pub endpoint_hash: String,
}

impl NewEventLogEntry {
    pub fn from_event(event: &PoolEvent, endpoint_hash: &str) -> Self {
        Self {
            event_type: event.event_type().to_string(),
            data: event.payload.clone(),
            endpoint_hash: endpoint_hash.to_string(),
        }
    }
}
