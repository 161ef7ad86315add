//! # Pool Events
//!
//! Wire records, the discriminated payload type and the decoder that turns one
//! into the other.

pub mod decoder;
pub mod error;
pub mod types;

// Re-export key types for convenience
pub use decoder::{decode_batch, decode_envelope, decode_event, parse_raw_event, resolve_payload};
pub use error::{DecodeError, DecodeResult};
pub use types::{
    EventEnvelope, EventPayload, JobProcessed, JobReceived, OrchestratorReset, PoolEvent,
    RawEvent, RemoteWorker,
};
