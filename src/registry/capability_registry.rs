//! # Capability Registry
//!
//! Compile-time catalogue of storage modules and feature capabilities,
//! keyed by the identifiers used in configuration.
//!
//! ## Usage
//!
//! ```rust
//! use openpool_core::capabilities::{DataLoader, EventSource, ChannelEventSource};
//! use openpool_core::registry::CapabilityRegistry;
//! use std::sync::Arc;
//!
//! let registry = CapabilityRegistry::with_builtins();
//!
//! // Replace the built-in data loader with one fed in-process
//! let (source, _sender) = ChannelEventSource::new("local");
//! let source: Arc<dyn EventSource> = Arc::new(source);
//! registry.register_feature("data-loader", move || {
//!     Box::new(DataLoader::with_sources(vec![source.clone()]))
//! });
//!
//! assert!(registry.has_feature("data-loader"));
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::capabilities::{
    Capability, DataLoader, LedgerReporter, MemoryStorage, PayoutLoop, StorageModule,
};
use crate::config::{ConfigResult, ConfigurationError};
use crate::constants::modules;
use crate::logging::log_registry_operation;

/// Builds a fresh, uninitialized feature module
pub type CapabilityFactory = Arc<dyn Fn() -> Box<dyn Capability> + Send + Sync>;

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub storage_modules: usize,
    pub feature_modules: usize,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    storage: RwLock<HashMap<String, Arc<dyn StorageModule>>>,
    features: RwLock<HashMap<String, CapabilityFactory>>,
}

impl CapabilityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every module shipped in this crate
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register_storage(modules::STORAGE_MEMORY, Arc::new(MemoryStorage));
        #[cfg(feature = "postgres")]
        registry.register_storage(
            modules::STORAGE_POSTGRES,
            Arc::new(crate::capabilities::PostgresStorage),
        );

        registry.register_feature(modules::DATA_LOADER, || Box::new(DataLoader::new()));
        registry.register_feature(modules::PAYOUT_LOOP, || Box::new(PayoutLoop::new()));
        registry.register_feature(modules::LEDGER_REPORTER, || {
            Box::new(LedgerReporter::default())
        });

        registry
    }

    /// Register a storage module, replacing any previous one with this name
    pub fn register_storage(&self, name: &str, module: Arc<dyn StorageModule>) {
        let replaced = self
            .storage
            .write()
            .insert(name.to_string(), module)
            .is_some();
        log_registry_operation(
            "register",
            "storage",
            Some(name),
            if replaced { "replaced" } else { "registered" },
            None,
        );
    }

    /// Register a feature factory, replacing any previous one with this name
    pub fn register_feature<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Capability> + Send + Sync + 'static,
    {
        let replaced = self
            .features
            .write()
            .insert(name.to_string(), Arc::new(factory))
            .is_some();
        log_registry_operation(
            "register",
            "feature",
            Some(name),
            if replaced { "replaced" } else { "registered" },
            None,
        );
    }

    /// Resolve a storage module identifier
    pub fn resolve_storage(&self, name: &str) -> ConfigResult<Arc<dyn StorageModule>> {
        self.storage
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::unknown_module("storage", name))
    }

    /// Build a fresh instance of a feature module
    pub fn create_feature(&self, name: &str) -> ConfigResult<Box<dyn Capability>> {
        let factory = self
            .features
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::unknown_module("feature", name))?;
        Ok(factory())
    }

    pub fn has_storage(&self, name: &str) -> bool {
        self.storage.read().contains_key(name)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.read().contains_key(name)
    }

    /// Registered feature identifiers, sorted
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.features.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            storage_modules: self.storage.read().len(),
            feature_modules: self.features.read().len(),
        }
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut storage: Vec<String> = self.storage.read().keys().cloned().collect();
        storage.sort();
        f.debug_struct("CapabilityRegistry")
            .field("storage", &storage)
            .field("features", &self.feature_names())
            .finish()
    }
}
