use thiserror::Error;

use crate::config::ConfigurationError;
use crate::events::DecodeError;
use crate::ledger::LedgerError;

/// Top-level error for the pool host and its capability modules
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A capability module failed outside the ledger
    #[error("Capability '{name}' failed: {reason}")]
    Capability { name: String, reason: String },

    /// An event source could not be read
    #[error("Event source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },
}

impl PoolError {
    pub fn capability<N: Into<String>, R: std::fmt::Display>(name: N, reason: R) -> Self {
        Self::Capability {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn event_source<N: Into<String>, R: std::fmt::Display>(source_name: N, reason: R) -> Self {
        Self::Source {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
