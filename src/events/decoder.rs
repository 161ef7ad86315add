//! # Event Decoder
//!
//! Turns raw event records into [`PoolEvent`]s with a resolved payload.
//!
//! Decoding happens in two stages. The envelope stage checks the outer
//! `{event_type, payload}` shape and fails with [`DecodeError::Envelope`]. The
//! payload stage decodes known discriminators into their fixed shape and fails
//! with [`DecodeError::Payload`]; unknown discriminators always succeed as an
//! open JSON value so producers can add kinds without breaking consumers.
//!
//! All functions here are pure.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{DecodeError, DecodeResult};
use super::types::{EventEnvelope, EventPayload, PoolEvent, RawEvent};
use crate::constants::events;

/// Parse a JSON-encoded [`RawEvent`] record.
pub fn parse_raw_event(json: &str) -> DecodeResult<RawEvent> {
    serde_json::from_str(json).map_err(|e| DecodeError::envelope(None, e))
}

/// Decode a raw record into a typed event.
pub fn decode_event(raw: RawEvent) -> DecodeResult<PoolEvent> {
    let envelope = decode_envelope(raw.id, &raw.payload)?;
    let parsed = resolve_payload(raw.id, envelope)?;

    Ok(PoolEvent {
        id: raw.id,
        payload: raw.payload,
        version: raw.version,
        timestamp: raw.timestamp,
        parsed,
    })
}

/// Decode every record in a batch, keeping failures next to successes.
///
/// A failed record never prevents its siblings from decoding.
pub fn decode_batch(raws: Vec<RawEvent>) -> (Vec<PoolEvent>, Vec<DecodeError>) {
    let mut decoded = Vec::with_capacity(raws.len());
    let mut failures = Vec::new();

    for raw in raws {
        match decode_event(raw) {
            Ok(event) => decoded.push(event),
            Err(e) => failures.push(e),
        }
    }

    (decoded, failures)
}

/// Decode the outer envelope from a payload string.
pub fn decode_envelope(event_id: i64, payload: &str) -> DecodeResult<EventEnvelope> {
    serde_json::from_str(payload).map_err(|e| DecodeError::envelope(Some(event_id), e))
}

/// Resolve an envelope's opaque payload into its typed variant.
pub fn resolve_payload(event_id: i64, envelope: EventEnvelope) -> DecodeResult<EventPayload> {
    let EventEnvelope {
        event_type,
        payload,
    } = envelope;

    let parsed = match event_type.as_str() {
        events::ORCHESTRATOR_RESET => {
            EventPayload::OrchestratorReset(typed(event_id, &event_type, payload)?)
        }
        events::WORKER_CONNECTED => {
            EventPayload::WorkerConnected(typed(event_id, &event_type, payload)?)
        }
        events::WORKER_DISCONNECTED => {
            EventPayload::WorkerDisconnected(typed(event_id, &event_type, payload)?)
        }
        events::JOB_RECEIVED => EventPayload::JobReceived(typed(event_id, &event_type, payload)?),
        events::JOB_PROCESSED => {
            EventPayload::JobProcessed(typed(event_id, &event_type, payload)?)
        }
        _ => EventPayload::Unknown {
            event_type,
            payload,
        },
    };

    Ok(parsed)
}

fn typed<T: DeserializeOwned>(event_id: i64, discriminator: &str, payload: Value) -> DecodeResult<T> {
    // Producers omit the payload entirely for data-less kinds.
    let payload = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    serde_json::from_value(payload).map_err(|e| DecodeError::payload(event_id, discriminator, e))
}
