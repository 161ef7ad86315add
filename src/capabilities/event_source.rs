//! Event sources polled by the data loader.
//!
//! A source yields raw event records. The ledger attributes everything a
//! source returns to its [`EventSource::endpoint_id`], so the id must be
//! stable across restarts: by default it is a UUIDv5 of the endpoint string.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::events::{parse_raw_event, RawEvent};

/// Stable identifier for an endpoint string.
pub fn endpoint_id(endpoint: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, endpoint.as_bytes()).to_string()
}

#[async_trait]
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Human-readable endpoint, used in logs
    fn endpoint(&self) -> &str;

    /// Provenance id the ledger pins workers to
    fn endpoint_id(&self) -> String {
        endpoint_id(self.endpoint())
    }

    /// Node type applied to this source's events when a payload omits it
    fn node_type(&self) -> Option<&str> {
        None
    }

    /// Fetch events at or after `since`.
    ///
    /// Sources may return events already applied; the ledger absorbs them.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawEvent>>;
}

/// In-process source fed through an unbounded channel.
///
/// Each event is delivered exactly once; the cursor is ignored.
pub struct ChannelEventSource {
    endpoint: String,
    receiver: Mutex<mpsc::UnboundedReceiver<RawEvent>>,
}

impl ChannelEventSource {
    pub fn new(endpoint: impl Into<String>) -> (Self, mpsc::UnboundedSender<RawEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let source = Self {
            endpoint: endpoint.into(),
            receiver: Mutex::new(receiver),
        };
        (source, sender)
    }
}

impl fmt::Debug for ChannelEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEventSource")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<RawEvent>> {
        let mut receiver = self.receiver.lock();
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        Ok(events)
    }
}

/// JSON-lines spool file with one raw event record per line.
///
/// A missing file reads as empty. Malformed lines are skipped with a warning.
#[derive(Debug, Clone)]
pub struct FileEventSource {
    endpoint: String,
    path: PathBuf,
    node_type: Option<String>,
}

impl FileEventSource {
    pub fn new(endpoint: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: path.into(),
            node_type: None,
        }
    }

    /// An empty `node_type` leaves the source without a default
    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        self.node_type = (!node_type.is_empty()).then_some(node_type);
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl EventSource for FileEventSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn node_type(&self) -> Option<&str> {
        self.node_type.as_deref()
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Spool file not present yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(PoolError::event_source(&self.endpoint, e)),
        };

        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_raw_event(line) {
                Ok(raw) if since.map_or(true, |cursor| raw.timestamp >= cursor) => {
                    events.push(raw)
                }
                Ok(_) => {}
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed spool line"
                ),
            }
        }

        Ok(events)
    }
}
