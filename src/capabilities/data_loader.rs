//! # Data Loader
//!
//! Polls every configured [`EventSource`] on a fixed interval, decodes what
//! it returns and applies the batch to the ledger under the source's
//! endpoint id. The fetch cursor for each source is the ledger's
//! `last_event_timestamp`, so a restart resumes where the ledger left off.
//!
//! Failures are contained per source and per tick: a source that cannot be
//! read, or a batch the ledger could not store, is retried on the next tick.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::event_source::{EventSource, FileEventSource};
use super::{initialized, Capability};
use crate::config::{ConfigurationError, PoolConfig};
use crate::constants::modules;
use crate::error::Result;
use crate::events::decode_batch;
use crate::ledger::WorkerLedger;
use crate::logging::log_error;

/// Counters for one polling pass over every source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderTick {
    pub fetched: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub decode_failures: usize,
    pub failed_sources: usize,
}

pub struct DataLoader {
    sources: Vec<Arc<dyn EventSource>>,
    fetch_interval: Duration,
    ledger: Option<Arc<dyn WorkerLedger>>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Loader whose sources come from the `data_loader` configuration section
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            fetch_interval: Duration::from_secs(30),
            ledger: None,
        }
    }

    /// Loader with sources supplied by the embedding application.
    ///
    /// Configured `data_sources` are added after these.
    pub fn with_sources(sources: Vec<Arc<dyn EventSource>>) -> Self {
        Self {
            sources,
            ..Self::new()
        }
    }

    pub fn sources(&self) -> &[Arc<dyn EventSource>] {
        &self.sources
    }

    /// Run one polling pass over every source.
    pub async fn poll_once(&self) -> Result<LoaderTick> {
        let ledger = initialized(self.name(), &self.ledger)?;
        let mut tick = LoaderTick::default();

        for source in &self.sources {
            if let Err(e) = Self::poll_source(ledger.as_ref(), source.as_ref(), &mut tick).await {
                tick.failed_sources += 1;
                log_error(
                    modules::DATA_LOADER,
                    "poll_source",
                    &e.to_string(),
                    Some(source.endpoint()),
                );
            }
        }

        Ok(tick)
    }

    #[instrument(skip_all, fields(endpoint = %source.endpoint()))]
    async fn poll_source(
        ledger: &dyn WorkerLedger,
        source: &dyn EventSource,
        tick: &mut LoaderTick,
    ) -> Result<()> {
        let endpoint_id = source.endpoint_id();
        let cursor = ledger.last_event_timestamp(&endpoint_id).await?;
        let raws = source.fetch(cursor).await?;
        if raws.is_empty() {
            return Ok(());
        }
        tick.fetched += raws.len();

        let (events, failures) = decode_batch(raws);
        for failure in &failures {
            warn!(event_id = ?failure.event_id(), error = %failure, "Dropping undecodable event");
        }
        tick.decode_failures += failures.len();

        let events = match source.node_type() {
            Some(node_type) => events
                .into_iter()
                .map(|event| event.with_default_node_type(node_type))
                .collect(),
            None => events,
        };

        let report = ledger.apply(&events, &endpoint_id).await?;
        tick.applied += report.applied;
        tick.duplicates += report.duplicates;
        tick.rejected += report.rejected.len();

        debug!(
            endpoint_id = %endpoint_id,
            applied = report.applied,
            duplicates = report.duplicates,
            rejected = report.rejected.len(),
            "Batch applied"
        );
        Ok(())
    }
}

#[async_trait]
impl Capability for DataLoader {
    fn name(&self) -> &str {
        modules::DATA_LOADER
    }

    async fn init(&mut self, config: &PoolConfig, ledger: Arc<dyn WorkerLedger>) -> Result<()> {
        let section = config.data_loader.as_ref().ok_or_else(|| {
            ConfigurationError::missing_required_field("data_loader", "data-loader module")
        })?;
        self.fetch_interval = section.fetch_interval();

        for source in &section.data_sources {
            let path = match &config.module_path {
                Some(base) => base.join(&source.endpoint),
                None => source.endpoint.clone().into(),
            };
            self.sources.push(Arc::new(
                FileEventSource::new(&source.endpoint, path).with_node_type(&source.node_type),
            ));
        }

        if self.sources.is_empty() {
            warn!("Data loader has no event sources configured");
        }
        self.ledger = Some(ledger);
        Ok(())
    }

    async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            sources = self.sources.len(),
            interval_secs = self.fetch_interval.as_secs(),
            "📥 DATA_LOADER: Polling started"
        );
        let mut interval = tokio::time::interval(self.fetch_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let tick = self.poll_once().await?;
                    if tick.fetched > 0 {
                        info!(
                            fetched = tick.fetched,
                            applied = tick.applied,
                            duplicates = tick.duplicates,
                            rejected = tick.rejected,
                            decode_failures = tick.decode_failures,
                            "📥 DATA_LOADER: Tick complete"
                        );
                    }
                }
            }
        }

        info!("📥 DATA_LOADER: Polling stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::event_source::ChannelEventSource;
    use crate::config::{DataLoaderConfig, DataSourceConfig};
    use crate::events::RawEvent;
    use crate::ledger::{InMemoryLedger, LedgerSettings};
    use chrono::Utc;
    use serde_json::json;

    fn raw(id: i64, envelope: serde_json::Value) -> RawEvent {
        RawEvent {
            id,
            payload: envelope.to_string(),
            version: 1,
            timestamp: Utc::now(),
        }
    }

    fn config() -> PoolConfig {
        let mut config = PoolConfig::with_storage("memory");
        config.region = "eu".to_string();
        config.data_loader = Some(DataLoaderConfig {
            module: "data-loader".to_string(),
            fetch_interval_seconds: 1,
            data_sources: vec![],
        });
        config
    }

    #[tokio::test]
    async fn test_poll_applies_under_endpoint_id() {
        let (source, sender) = ChannelEventSource::new("https://orch-1.example.com");
        let source: Arc<dyn EventSource> = Arc::new(source);
        let endpoint_id = source.endpoint_id();

        let config = config();
        let ledger = Arc::new(InMemoryLedger::new(LedgerSettings::from_config(&config)));
        let mut loader = DataLoader::with_sources(vec![source]);
        loader.init(&config, ledger.clone()).await.unwrap();

        sender
            .send(raw(
                1,
                json!({
                    "event_type": "worker-connected",
                    "payload": {"ethAddress": "0xa", "nodeType": "transcoder"}
                }),
            ))
            .unwrap();
        sender.send(raw(2, json!({"event_type": 7}))).unwrap();
        sender
            .send(raw(3, json!({"event_type": "pool-stats", "payload": {"n": 1}})))
            .unwrap();

        let tick = loader.poll_once().await.unwrap();
        assert_eq!(tick.fetched, 3);
        assert_eq!(tick.applied, 2);
        assert_eq!(tick.decode_failures, 1);

        let workers = ledger.get_workers().await.unwrap();
        assert_eq!(workers[0].endpoint_hash, endpoint_id);
        assert_eq!(workers[0].region, "eu");
        assert!(ledger.last_event_timestamp(&endpoint_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_init_builds_file_sources_under_module_path() {
        let mut config = config();
        config.module_path = Some("/var/spool/openpool".into());
        if let Some(section) = config.data_loader.as_mut() {
            section.data_sources.push(DataSourceConfig {
                endpoint: "orch-1.jsonl".to_string(),
                node_type: "transcoder".to_string(),
            });
        }

        let mut loader = DataLoader::new();
        let ledger = Arc::new(InMemoryLedger::default());
        loader.init(&config, ledger).await.unwrap();

        assert_eq!(loader.sources().len(), 1);
        assert_eq!(loader.sources()[0].endpoint(), "orch-1.jsonl");
        assert_eq!(loader.sources()[0].node_type(), Some("transcoder"));
    }

    #[tokio::test]
    async fn test_configured_node_type_fills_bare_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("orch-1.jsonl");
        let lines = [
            raw(1, json!({"event_type": "worker-connected", "payload": {"ethAddress": "0xa"}})),
            raw(2, json!({"event_type": "job-processed", "payload": {
                "ethAddress": "0xa", "requestID": "r-1", "fees": 40
            }})),
            raw(3, json!({"event_type": "worker-connected", "payload": {
                "ethAddress": "0xb", "nodeType": "ai"
            }})),
        ]
        .iter()
        .map(|record| serde_json::to_string(record).unwrap())
        .collect::<Vec<_>>();
        std::fs::write(&spool, lines.join("\n")).unwrap();

        let mut config = config();
        config.module_path = Some(dir.path().to_path_buf());
        if let Some(section) = config.data_loader.as_mut() {
            section.data_sources.push(DataSourceConfig {
                endpoint: "orch-1.jsonl".to_string(),
                node_type: "transcoder".to_string(),
            });
        }

        let ledger = Arc::new(InMemoryLedger::new(LedgerSettings::from_config(&config)));
        let mut loader = DataLoader::new();
        loader.init(&config, ledger.clone()).await.unwrap();

        let tick = loader.poll_once().await.unwrap();
        assert_eq!(tick.applied, 3);
        assert_eq!(tick.rejected, 0);

        let mut workers = ledger.get_workers().await.unwrap();
        workers.sort_by(|a, b| a.eth_address.cmp(&b.eth_address));
        assert_eq!(workers[0].node_type, "transcoder");
        assert_eq!(workers[0].pending_fees, 40);
        assert_eq!(workers[1].node_type, "ai");
    }

    #[tokio::test]
    async fn test_bare_payloads_without_configured_node_type_are_rejected() {
        let (source, sender) = ChannelEventSource::new("orch-2");
        let source: Arc<dyn EventSource> = Arc::new(source);
        let config = config();
        let ledger = Arc::new(InMemoryLedger::new(LedgerSettings::from_config(&config)));
        let mut loader = DataLoader::with_sources(vec![source]);
        loader.init(&config, ledger.clone()).await.unwrap();

        sender
            .send(raw(1, json!({"event_type": "worker-connected", "payload": {"ethAddress": "0xa"}})))
            .unwrap();

        let tick = loader.poll_once().await.unwrap();
        assert_eq!(tick.rejected, 1);
        assert!(ledger.get_workers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_before_init_fails() {
        let loader = DataLoader::new();
        assert!(loader.poll_once().await.is_err());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let mut loader = DataLoader::new();
        loader
            .init(&config(), Arc::new(InMemoryLedger::default()))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(loader).start(token.clone()));
        token.cancel();
        tokio_test::assert_ok!(handle.await.unwrap());
    }
}
