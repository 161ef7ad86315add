//! # Registry Infrastructure
//!
//! Maps the module identifiers named in configuration to the storage modules
//! and capability factories compiled into the binary. Embedding applications
//! register their own modules here before bootstrapping the host.

pub mod capability_registry;

pub use capability_registry::{CapabilityFactory, CapabilityRegistry, RegistryStats};
