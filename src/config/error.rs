//! Configuration Error Types
//!
//! Errors raised while loading or validating configuration, and while
//! resolving configured module identifiers. All of them are fatal before any
//! capability module starts.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at the given location
    #[error("Configuration file not found: {path:?}")]
    ConfigFileNotFound { path: PathBuf },

    /// The file or an override could not be parsed into the configuration
    #[error("Failed to load configuration from '{source_name}': {error}")]
    LoadError { source_name: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// A configured module identifier has no registered implementation
    #[error("Unknown {kind} module '{name}'")]
    UnknownModule { kind: String, name: String },

    /// A module rejected its configuration during initialization
    #[error("Module '{name}' failed to initialize: {error}")]
    ModuleInitError { name: String, error: String },
}

impl ConfigurationError {
    /// Create a load error
    pub fn load_error<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::LoadError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create an unknown module error
    pub fn unknown_module<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        Self::UnknownModule {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a module init error
    pub fn module_init_error<N: Into<String>, E: std::fmt::Display>(name: N, error: E) -> Self {
        Self::ModuleInitError {
            name: name.into(),
            error: error.to_string(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
