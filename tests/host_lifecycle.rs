//! Host Lifecycle Tests
//!
//! Bootstraps the pool from configuration with in-process event sources and
//! checks that events flow from a source through the data loader into the
//! ledger, then out through the payout loop.

mod common;

use common::*;
use openpool_core::capabilities::{
    endpoint_id, ChannelEventSource, DataLoader, EventSource, PayoutLoop, PayoutSender,
};
use openpool_core::config::{
    ConfigManager, ConfigurationError, DataLoaderConfig, PayoutLoopConfig, PoolConfig,
};
use openpool_core::error::{PoolError, Result};
use openpool_core::orchestration::{ModuleState, PoolHost};
use openpool_core::registry::CapabilityRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

#[derive(Debug, Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, i64)>>,
}

#[async_trait::async_trait]
impl PayoutSender for RecordingSender {
    async fn send(&self, eth_address: &str, amount: i64) -> Result<String> {
        let mut sent = self.sent.lock();
        sent.push((eth_address.to_string(), amount));
        Ok(format!("0xtx{}", sent.len()))
    }
}

fn pool_config() -> PoolConfig {
    let mut config = PoolConfig::with_storage("memory");
    config.region = TEST_REGION.to_string();
    config.data_loader = Some(DataLoaderConfig {
        module: "data-loader".to_string(),
        fetch_interval_seconds: 1,
        data_sources: Vec::new(),
    });
    config
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn events_flow_from_source_into_ledger() {
    let (source, sender) = ChannelEventSource::new("orchestrator-1");
    let source: Arc<dyn EventSource> = Arc::new(source);
    let pinned = endpoint_id("orchestrator-1");

    let registry = CapabilityRegistry::with_builtins();
    let loader_source = source.clone();
    registry.register_feature("data-loader", move || {
        Box::new(DataLoader::with_sources(vec![loader_source.clone()]))
    });

    let manager = assert_ok!(ConfigManager::from_config(pool_config()));
    let host = assert_ok!(PoolHost::bootstrap(manager, &registry).await);
    let ledger = host.ledger();
    let handle = host.start();

    sender
        .send(raw(1, worker_connected("0xa", "transcoder")))
        .unwrap();
    sender
        .send(raw(2, job_processed("0xa", "transcoder", "req-1", 2_000)))
        .unwrap();

    let mut pending = 0;
    for _ in 0..300 {
        let workers = assert_ok!(ledger.get_workers().await);
        if let Some(worker) = workers.first() {
            pending = worker.pending_fees;
            if pending == 2_000 {
                assert_eq!(worker.endpoint_hash, pinned);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pending, 2_000);
    assert_eq!(
        handle.module_state("data-loader"),
        Some(ModuleState::Running)
    );

    assert_ok!(handle.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn payout_loop_pays_workers_over_threshold() {
    let recorder = Arc::new(RecordingSender::default());
    let registry = CapabilityRegistry::with_builtins();
    let sender: Arc<dyn PayoutSender> = recorder.clone();
    registry.register_feature("payout-loop", move || {
        Box::new(PayoutLoop::with_sender(sender.clone()))
    });

    let mut config = pool_config();
    config.data_loader = None;
    config.payout_loop = Some(PayoutLoopConfig {
        module: "payout-loop".to_string(),
        rpc_url: String::new(),
        private_key_store_path: String::new(),
        private_key_passphrase_path: String::new(),
        payout_frequency_seconds: 3600,
        payout_threshold: "1000".to_string(),
        dry_run: false,
    });

    let manager = assert_ok!(ConfigManager::from_config(config));
    let host = assert_ok!(PoolHost::bootstrap(manager, &registry).await);
    let ledger = host.ledger();
    assert_ok!(
        ledger
            .apply(
                &[
                    decoded(1, worker_connected("0xa", "ai")),
                    decoded(2, worker_connected("0xb", "ai")),
                    decoded(3, job_processed("0xa", "ai", "req-1", 1_500)),
                    decoded(4, job_processed("0xb", "ai", "req-2", 999)),
                ],
                "orchestrator-1",
            )
            .await
    );

    let handle = host.start();
    wait_for(|| !recorder.sent.lock().is_empty()).await;
    assert_ok!(handle.shutdown(Duration::from_secs(5)).await);

    assert_eq!(*recorder.sent.lock(), vec![("0xa".to_string(), 1_500)]);
    let payouts = assert_ok!(ledger.payouts("0xa").await);
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].tx_hash, "0xtx1");
    assert!(assert_ok!(ledger.payouts("0xb").await).is_empty());
}

#[tokio::test]
async fn payout_loop_without_sender_fails_init() {
    let registry = CapabilityRegistry::with_builtins();
    let mut config = pool_config();
    config.payout_loop = Some(PayoutLoopConfig {
        module: "payout-loop".to_string(),
        rpc_url: String::new(),
        private_key_store_path: String::new(),
        private_key_passphrase_path: String::new(),
        payout_frequency_seconds: 60,
        payout_threshold: "1000".to_string(),
        dry_run: false,
    });

    let manager = assert_ok!(ConfigManager::from_config(config));
    let result = PoolHost::bootstrap(manager, &registry).await;

    assert!(matches!(
        result,
        Err(PoolError::Configuration(ConfigurationError::ModuleInitError { ref name, .. }))
            if name == "payout-loop"
    ));
}

#[tokio::test]
async fn unknown_storage_module_fails_bootstrap() {
    let registry = CapabilityRegistry::with_builtins();
    let mut config = pool_config();
    config.storage_module = "cassandra".to_string();

    // Validation passes; resolution happens at bootstrap
    let manager = assert_ok!(ConfigManager::from_config(config));
    let result = PoolHost::bootstrap(manager, &registry).await;

    assert!(matches!(
        result,
        Err(PoolError::Configuration(ConfigurationError::UnknownModule { ref kind, .. }))
            if kind == "storage"
    ));
}

#[tokio::test]
async fn status_reports_every_module() {
    let registry = CapabilityRegistry::with_builtins();
    let mut config = pool_config();
    config.reporter = Some(openpool_core::config::ReporterConfig {
        module: "ledger-reporter".to_string(),
        interval_seconds: 3600,
    });

    let manager = assert_ok!(ConfigManager::from_config(config));
    let host = assert_ok!(PoolHost::bootstrap(manager, &registry).await);
    assert_eq!(host.module_names(), vec!["data-loader", "ledger-reporter"]);

    let handle = host.start();
    let status = handle.status();
    assert!(status.running);
    assert_eq!(status.storage_backend, "memory");
    assert_eq!(
        status
            .modules
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>(),
        vec!["data-loader", "ledger-reporter"]
    );

    let token = handle.cancellation_token();
    assert_ok!(handle.shutdown(Duration::from_secs(5)).await);
    assert!(token.is_cancelled());
}
