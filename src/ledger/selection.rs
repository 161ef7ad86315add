//! Preferred-worker selection policy.
//!
//! Backends always apply the node type / region equality filters themselves;
//! this module interprets the open `criteria` map on top of that result.
//! Recognised keys: `connected` (bool), `limit` (non-negative integer) and
//! `strategy` (`any`, `least_pending`, `round_robin`). Unrecognised keys and
//! values of the wrong type are ignored.

use serde_json::{Map, Value};

use crate::constants::criteria as keys;
use crate::models::WorkerRecord;

/// Ordering strategy among eligible workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// No particular order
    #[default]
    Any,
    /// Lowest pending fees first
    LeastPending,
    /// Rotate the starting worker on every query
    RoundRobin,
}

impl SelectionStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "any" => Some(Self::Any),
            "least_pending" => Some(Self::LeastPending),
            "round_robin" => Some(Self::RoundRobin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub connected_only: bool,
    pub limit: Option<usize>,
    pub strategy: SelectionStrategy,
}

impl SelectionPolicy {
    pub fn from_criteria(criteria: &Map<String, Value>) -> Self {
        Self {
            connected_only: criteria
                .get(keys::CONNECTED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            limit: criteria
                .get(keys::LIMIT)
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            strategy: criteria
                .get(keys::STRATEGY)
                .and_then(Value::as_str)
                .and_then(SelectionStrategy::parse)
                .unwrap_or_default(),
        }
    }

    /// Order and trim already-filtered candidates.
    ///
    /// `rotation` is a monotonically increasing counter owned by the backend;
    /// it only matters for [`SelectionStrategy::RoundRobin`].
    pub fn select(&self, mut candidates: Vec<WorkerRecord>, rotation: usize) -> Vec<WorkerRecord> {
        if self.connected_only {
            candidates.retain(|w| w.is_connected);
        }

        match self.strategy {
            SelectionStrategy::Any => {}
            SelectionStrategy::LeastPending => {
                candidates.sort_by(|a, b| {
                    a.pending_fees
                        .cmp(&b.pending_fees)
                        .then_with(|| a.eth_address.cmp(&b.eth_address))
                });
            }
            SelectionStrategy::RoundRobin => {
                candidates.sort_by(|a, b| a.eth_address.cmp(&b.eth_address));
                if !candidates.is_empty() {
                    let offset = rotation % candidates.len();
                    candidates.rotate_left(offset);
                }
            }
        }

        if let Some(limit) = self.limit {
            candidates.truncate(limit);
        }

        candidates
    }
}
