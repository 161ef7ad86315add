use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite worker identity: one record per (eth address, node type, region).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerKey {
    pub eth_address: String,
    pub node_type: String,
    pub region: String,
}

impl WorkerKey {
    pub fn new(
        eth_address: impl Into<String>,
        node_type: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            eth_address: eth_address.into(),
            node_type: node_type.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.eth_address, self.node_type, self.region)
    }
}

/// Worker ledger record.
///
/// Monetary fields are integer smallest-unit (wei) amounts and are never
/// negative. `endpoint_hash` is pinned on first sighting and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct WorkerRecord {
    pub eth_address: String,
    pub node_type: String,
    pub region: String,
    pub endpoint_hash: String,
    pub is_connected: bool,
    pub pending_fees: i64,
    pub paid_fees: i64,
    pub last_updated: DateTime<Utc>,
    pub connection: Option<String>,
}

impl WorkerRecord {
    /// Create a fresh, disconnected record pinned to `endpoint_hash`.
    pub fn new(key: &WorkerKey, endpoint_hash: impl Into<String>) -> Self {
        Self {
            eth_address: key.eth_address.clone(),
            node_type: key.node_type.clone(),
            region: key.region.clone(),
            endpoint_hash: endpoint_hash.into(),
            is_connected: false,
            pending_fees: 0,
            paid_fees: 0,
            last_updated: Utc::now(),
            connection: None,
        }
    }

    pub fn key(&self) -> WorkerKey {
        WorkerKey::new(&self.eth_address, &self.node_type, &self.region)
    }

    pub fn matches(&self, node_type: &str, region: &str) -> bool {
        self.node_type == node_type && self.region == region
    }

    /// Touch the record's update time.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
