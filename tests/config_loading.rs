//! Configuration Loading Tests
//!
//! Loads configuration documents from disk and bootstraps the host from them.

mod common;

use common::*;
use openpool_core::capabilities::endpoint_id;
use openpool_core::config::{ConfigManager, ConfigurationError};
use openpool_core::orchestration::PoolHost;
use openpool_core::registry::CapabilityRegistry;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio_test::assert_ok;

#[test]
fn shipped_configuration_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/openpool.yaml");
    let manager = assert_ok!(ConfigManager::load_with_env(&path, "development"));
    let config = manager.config();

    assert_eq!(config.storage_module, "memory");
    assert_eq!(config.commission_bps(), 500);
    assert_eq!(
        config.feature_modules(),
        vec!["payout-loop", "data-loader", "ledger-reporter"]
    );
    assert_eq!(manager.source(), Some(path.as_path()));
}

#[test]
fn production_overlay_switches_to_postgres() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/openpool.yaml");
    let manager = assert_ok!(ConfigManager::load_with_env(&path, "production"));
    let config = manager.config();

    assert_eq!(config.storage_module, "postgres");
    assert_eq!(config.database.as_ref().unwrap().max_connections, 20);
    assert_eq!(
        assert_ok!(config.payout_loop.as_ref().unwrap().threshold_wei()),
        100_000_000_000_000_000
    );

    let masked = manager.debug_config();
    assert!(masked["database"]["url"]
        .as_str()
        .unwrap()
        .starts_with("[MASKED"));
}

#[test]
fn invalid_commission_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.yaml");
    std::fs::write(&path, "storage_module: memory\npool_commission_rate: 1.5\n").unwrap();

    let result = ConfigManager::load_with_env(&path, "test");
    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "pool_commission_rate"
    ));
}

#[tokio::test]
async fn file_sources_resolve_against_module_path() {
    let dir = tempfile::tempdir().unwrap();
    let spool = dir.path().join("orch-1.jsonl");
    {
        let mut file = std::fs::File::create(&spool).unwrap();
        for record in [
            raw(1, worker_connected("0xa", "transcoder")),
            raw(2, job_processed("0xa", "transcoder", "req-1", 700)),
        ] {
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }
        writeln!(file, "this line is not an event").unwrap();
    }

    let config_path = dir.path().join("openpool.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"
module_path: "{}"
storage_module: memory
region: {TEST_REGION}
data_loader:
  module: data-loader
  fetch_interval_seconds: 1
  data_sources:
    - endpoint: orch-1.jsonl
"#,
            dir.path().display()
        ),
    )
    .unwrap();

    let manager = assert_ok!(ConfigManager::load_with_env(&config_path, "test"));
    let registry = CapabilityRegistry::with_builtins();
    let host = assert_ok!(PoolHost::bootstrap(manager, &registry).await);
    let ledger = host.ledger();
    let handle = host.start();

    let mut workers = Vec::new();
    for _ in 0..300 {
        workers = assert_ok!(ledger.get_workers().await);
        if workers.first().map(|w| w.pending_fees) == Some(700) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_ok!(handle.shutdown(Duration::from_secs(5)).await);

    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].pending_fees, 700);
    assert_eq!(workers[0].endpoint_hash, endpoint_id("orch-1.jsonl"));
    assert_eq!(
        assert_ok!(ledger.last_event_timestamp(&endpoint_id("orch-1.jsonl")).await),
        Some(base_time() + chrono::Duration::seconds(2))
    );
}
