//! Idempotency keys for event replay.
//!
//! Job events are deduplicated by source endpoint, discriminator and request
//! id, so a `job-received` and a `job-processed` for the same request are
//! distinct and two orchestrators may reuse a request id. Every other event is deduplicated by `(source endpoint, id, version)`;
//! `version` is treated as an opaque producer-assigned value.

use std::fmt;

use crate::events::PoolEvent;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Job {
        source_endpoint: String,
        discriminator: String,
        request_id: String,
    },
    Event {
        source_endpoint: String,
        event_id: i64,
        version: i64,
    },
}

impl DedupKey {
    pub fn for_event(event: &PoolEvent, source_endpoint: &str) -> Self {
        match event.parsed.request_id() {
            Some(request_id) => Self::Job {
                source_endpoint: source_endpoint.to_string(),
                discriminator: event.event_type().to_string(),
                request_id: request_id.to_string(),
            },
            None => Self::Event {
                source_endpoint: source_endpoint.to_string(),
                event_id: event.id,
                version: event.version,
            },
        }
    }
}

/// Stable textual form, used as the storage key by persistent backends.
impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job {
                source_endpoint,
                discriminator,
                request_id,
            } => write!(f, "job:{source_endpoint}:{discriminator}:{request_id}"),
            Self::Event {
                source_endpoint,
                event_id,
                version,
            } => write!(f, "event:{source_endpoint}:{event_id}:{version}"),
        }
    }
}
