use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Preferred-worker query.
///
/// `node_type` and `region` are strict equality filters honoured by every
/// backend. `criteria` is forwarded to the backend unmodified; how it is
/// interpreted is backend policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCriteria {
    pub node_type: String,
    pub region: String,
    #[serde(default)]
    pub criteria: Map<String, Value>,
}

impl WorkerCriteria {
    pub fn new(node_type: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            region: region.into(),
            criteria: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.insert(key.into(), value.into());
        self
    }
}
