use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded payout to a worker address. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    pub id: i64,
    pub eth_address: String,
    pub tx_hash: String,
    pub fees: i64,
    pub created_at: DateTime<Utc>,
}
