//! # Structured Logging Module
//!
//! Environment-aware structured logging for the pool host. Output goes to
//! stdout, as human-readable lines by default or as JSON when
//! `OPENPOOL_LOG_FORMAT=json`. `RUST_LOG` overrides the environment's
//! default level.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if json_output() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("OPENPOOL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn json_output() -> bool {
    std::env::var("OPENPOOL_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for ledger operations
pub fn log_ledger_operation(
    operation: &str,
    backend: &str,
    source_endpoint: Option<&str>,
    worker: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        backend = %backend,
        source_endpoint = source_endpoint,
        worker = worker,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📒 LEDGER_OPERATION"
    );
}

/// Log structured data for capability module lifecycle events
pub fn log_capability_operation(
    operation: &str,
    module: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        module = %module,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧩 CAPABILITY_OPERATION"
    );
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    kind: &str,
    name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        kind = %kind,
        name = name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
