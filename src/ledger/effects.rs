//! Translation of decoded events into ledger mutations.
//!
//! Backends share this planning step so every storage engine applies the same
//! semantics; they differ only in how they lock and persist.

use crate::constants::units::BASIS_POINTS;
use crate::events::{EventPayload, PoolEvent};
use crate::models::{WorkerKey, WorkerRecord};

use super::error::{LedgerError, LedgerResult};
use super::LedgerSettings;

/// What applying one event does to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEffect {
    /// Mutate (or create) exactly one worker.
    Worker { key: WorkerKey, change: WorkerChange },
    /// Disconnect every worker pinned to the event's source endpoint.
    ResetSource,
    /// Record the event in the audit log only.
    LogOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerChange {
    Connectivity {
        connected: bool,
        connection: Option<String>,
    },
    JobReceived,
    CreditFees {
        gross: i64,
        net: i64,
    },
}

impl WorkerChange {
    /// Apply the change to a worker record.
    ///
    /// On error the record is left untouched.
    pub fn apply_to(&self, record: &mut WorkerRecord) -> LedgerResult<()> {
        match self {
            WorkerChange::Connectivity {
                connected,
                connection,
            } => {
                record.is_connected = *connected;
                if connection.is_some() {
                    record.connection = connection.clone();
                }
            }
            WorkerChange::JobReceived => {
                record.is_connected = true;
            }
            WorkerChange::CreditFees { net, .. } => {
                record.pending_fees = credit(record, *net)?;
            }
        }

        record.touch();
        Ok(())
    }
}

/// Pending balance after crediting `amount`, rejecting negatives and overflow.
pub fn credit(record: &WorkerRecord, amount: i64) -> LedgerResult<i64> {
    if amount < 0 {
        return Err(LedgerError::InvalidAmount {
            worker: record.key(),
            amount,
            reason: "amount must not be negative".to_string(),
        });
    }

    record
        .pending_fees
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidAmount {
            worker: record.key(),
            amount,
            reason: "pending fees would overflow".to_string(),
        })
}

/// Balances after paying out `amount` from pending into paid.
pub fn settle(record: &WorkerRecord, amount: i64) -> LedgerResult<(i64, i64)> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount {
            worker: record.key(),
            amount,
            reason: "payout amount must be positive".to_string(),
        });
    }
    if amount > record.pending_fees {
        return Err(LedgerError::InsufficientPendingFees {
            worker: record.key(),
            pending: record.pending_fees,
            requested: amount,
        });
    }

    let paid = record
        .paid_fees
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidAmount {
            worker: record.key(),
            amount,
            reason: "paid fees would overflow".to_string(),
        })?;

    Ok((record.pending_fees - amount, paid))
}

/// Worker share of `fees` after the pool commission, in smallest units.
///
/// Commission is rounded down so the worker is never under-credited.
pub fn net_of_commission(fees: i64, commission_bps: i64) -> i64 {
    let commission = i128::from(fees) * i128::from(commission_bps) / i128::from(BASIS_POINTS);
    fees - commission as i64
}

/// Plan the effect of one event.
pub fn plan(
    event: &PoolEvent,
    source_endpoint: &str,
    settings: &LedgerSettings,
) -> LedgerResult<EventEffect> {
    let region_or_default = |region: &str| {
        if region.is_empty() {
            settings.default_region.clone()
        } else {
            region.to_string()
        }
    };

    let unattributable = |reason: &str| LedgerError::Unattributable {
        event_id: event.id,
        discriminator: event.event_type().to_string(),
        source_endpoint: source_endpoint.to_string(),
        reason: reason.to_string(),
    };

    // Payload fields are zero-filled on decode; a worker key needs both parts
    let attribute = |eth_address: &str, node_type: &str| {
        if eth_address.is_empty() {
            Err(unattributable("empty ethAddress"))
        } else if node_type.is_empty() {
            Err(unattributable("empty nodeType"))
        } else {
            Ok(())
        }
    };

    let effect = match &event.parsed {
        EventPayload::OrchestratorReset(_) => EventEffect::ResetSource,
        EventPayload::WorkerConnected(worker) | EventPayload::WorkerDisconnected(worker) => {
            attribute(&worker.eth_address, &worker.node_type)?;
            EventEffect::Worker {
                key: WorkerKey::new(
                    &worker.eth_address,
                    &worker.node_type,
                    region_or_default(&worker.region),
                ),
                change: WorkerChange::Connectivity {
                    connected: matches!(event.parsed, EventPayload::WorkerConnected(_)),
                    connection: worker.connection.clone().filter(|c| !c.is_empty()),
                },
            }
        }
        EventPayload::JobReceived(job) => {
            attribute(&job.eth_address, &job.node_type)?;
            EventEffect::Worker {
                key: WorkerKey::new(
                    &job.eth_address,
                    &job.node_type,
                    settings.default_region.clone(),
                ),
                change: WorkerChange::JobReceived,
            }
        }
        EventPayload::JobProcessed(job) => {
            let eth_address = job
                .eth_address
                .as_deref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| unattributable("missing ethAddress"))?;
            attribute(eth_address, &job.node_type)?;
            if job.fees < 0 {
                return Err(unattributable("negative fees"));
            }
            EventEffect::Worker {
                key: WorkerKey::new(eth_address, &job.node_type, settings.default_region.clone()),
                change: WorkerChange::CreditFees {
                    gross: job.fees,
                    net: net_of_commission(job.fees, settings.commission_bps),
                },
            }
        }
        EventPayload::Unknown { .. } => EventEffect::LogOnly,
    };

    Ok(effect)
}
