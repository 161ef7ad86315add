use thiserror::Error;

use crate::models::WorkerKey;

/// Ledger operation failures.
///
/// Every variant carries the worker key, event id or source endpoint needed
/// to replay the operation safely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The worker is pinned to a different source endpoint.
    #[error("Worker {worker} is pinned to endpoint '{pinned_endpoint}', rejecting event {event_id:?} from '{source_endpoint}'")]
    SourceMismatch {
        event_id: Option<i64>,
        worker: WorkerKey,
        pinned_endpoint: String,
        source_endpoint: String,
    },

    /// The event cannot be attributed to a worker key.
    #[error("Event {event_id} ('{discriminator}') from '{source_endpoint}' cannot be attributed to a worker: {reason}")]
    Unattributable {
        event_id: i64,
        discriminator: String,
        source_endpoint: String,
        reason: String,
    },

    #[error("Worker {worker} not found")]
    WorkerNotFound { worker: WorkerKey },

    #[error("Invalid amount {amount} for worker {worker}: {reason}")]
    InvalidAmount {
        worker: WorkerKey,
        amount: i64,
        reason: String,
    },

    #[error("Worker {worker} has {pending} pending fees, cannot pay out {requested}")]
    InsufficientPendingFees {
        worker: WorkerKey,
        pending: i64,
        requested: i64,
    },

    /// Backend I/O failure. The failing operation made no partial mutation.
    #[error("Storage error during {operation}: {reason}")]
    Storage { operation: String, reason: String },
}

impl LedgerError {
    pub fn storage(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
