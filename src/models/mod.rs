//! # Ledger Models
//!
//! Record shapes maintained by the worker ledger: workers keyed by their
//! composite identity, append-only payouts and the append-only event log.

pub mod criteria;
pub mod event_log;
pub mod payout;
pub mod worker;

// Re-export core models for easy access
pub use criteria::WorkerCriteria;
pub use event_log::{EventLogEntry, NewEventLogEntry};
pub use payout::PayoutRecord;
pub use worker::{WorkerKey, WorkerRecord};
