use thiserror::Error;

/// Per-event decode failures. Local to one event; never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The record or its `{event_type, payload}` envelope is malformed.
    #[error("Malformed event envelope (event {event_id:?}): {reason}")]
    Envelope {
        event_id: Option<i64>,
        reason: String,
    },

    /// A known discriminator's payload does not match its fixed shape.
    #[error("Malformed '{discriminator}' payload in event {event_id}: {reason}")]
    Payload {
        event_id: i64,
        discriminator: String,
        reason: String,
    },
}

impl DecodeError {
    pub fn envelope(event_id: Option<i64>, error: serde_json::Error) -> Self {
        Self::Envelope {
            event_id,
            reason: error.to_string(),
        }
    }

    pub fn payload(event_id: i64, discriminator: &str, error: serde_json::Error) -> Self {
        Self::Payload {
            event_id,
            discriminator: discriminator.to_string(),
            reason: error.to_string(),
        }
    }

    pub fn event_id(&self) -> Option<i64> {
        match self {
            Self::Envelope { event_id, .. } => *event_id,
            Self::Payload { event_id, .. } => Some(*event_id),
        }
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
