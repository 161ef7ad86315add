//! # Capability Module Lifecycle Host
//!
//! Bootstraps the storage module and feature capabilities named in
//! configuration and supervises them until shutdown.

pub mod bootstrap;

pub use bootstrap::{ModuleState, PoolHandle, PoolHost, SystemStatus, DEFAULT_SHUTDOWN_TIMEOUT};
