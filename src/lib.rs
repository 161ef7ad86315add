#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # OpenPool Core
//!
//! Worker fee ledger and capability host for a compute-marketplace pool.
//!
//! ## Overview
//!
//! Orchestrators report operational events (workers connecting and
//! disconnecting, jobs received and processed, orchestrator resets). The pool
//! decodes them into typed events, accumulates each worker's pending and paid
//! fees in a ledger, and lets independently scheduled capability modules
//! (data loading, payouts, reporting) share that ledger.
//!
//! ## Key Guarantees
//!
//! - **Tolerant decoding**: unknown event kinds decode as open JSON and never
//!   fail a batch
//! - **Idempotent replay**: applying the same event twice equals applying it once
//! - **Source pinning**: a worker only accepts events from the endpoint that
//!   first reported it
//! - **Per-worker atomicity**: concurrent balance updates to one worker never
//!   interleave
//!
//! ## Module Organization
//!
//! - [`events`] - Wire records, typed payloads and the decoder
//! - [`ledger`] - The `WorkerLedger` contract and its in-memory and PostgreSQL backends
//! - [`models`] - Worker, payout, event log and selection criteria records
//! - [`capabilities`] - Storage modules and the built-in feature modules
//! - [`registry`] - Identifier to module resolution
//! - [`orchestration`] - Bootstrap and supervision of capability modules
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Top-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openpool_core::config::ConfigManager;
//! use openpool_core::orchestration::{PoolHost, DEFAULT_SHUTDOWN_TIMEOUT};
//! use openpool_core::registry::CapabilityRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load("config/openpool.yaml")?;
//! let registry = CapabilityRegistry::with_builtins();
//!
//! let handle = PoolHost::bootstrap(config, &registry).await?.start();
//! handle
//!     .run_until(
//!         async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         },
//!         DEFAULT_SHUTDOWN_TIMEOUT,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                   # Unit and integration tests
//! DATABASE_URL=postgres://... cargo test -- --ignored   # PostgreSQL backend
//! cargo bench --features benchmarks            # Ledger benchmarks
//! ```

pub mod capabilities;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;

pub use config::{ConfigManager, ConfigurationError, PoolConfig};
pub use error::{PoolError, Result};
pub use events::{decode_event, DecodeError, EventPayload, PoolEvent, RawEvent};
pub use ledger::{ApplyReport, InMemoryLedger, LedgerError, WorkerLedger};
#[cfg(feature = "postgres")]
pub use ledger::PgLedger;
pub use models::{PayoutRecord, WorkerCriteria, WorkerKey, WorkerRecord};
pub use orchestration::{PoolHandle, PoolHost};
pub use registry::CapabilityRegistry;
