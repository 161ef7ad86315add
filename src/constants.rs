//! # System Constants
//!
//! Core constants that define the operational boundaries of the pool: event
//! discriminators, monetary units and built-in capability identifiers.

/// Event discriminators understood by the decoder.
///
/// Anything outside this set is decoded as an open mapping.
pub mod events {
    pub const ORCHESTRATOR_RESET: &str = "orchestrator-reset";
    pub const WORKER_CONNECTED: &str = "worker-connected";
    pub const WORKER_DISCONNECTED: &str = "worker-disconnected";
    pub const JOB_RECEIVED: &str = "job-received";
    pub const JOB_PROCESSED: &str = "job-processed";

    pub const KNOWN: [&str; 5] = [
        ORCHESTRATOR_RESET,
        WORKER_CONNECTED,
        WORKER_DISCONNECTED,
        JOB_RECEIVED,
        JOB_PROCESSED,
    ];
}

/// Monetary units.
pub mod units {
    /// Smallest units (wei) per unit of account (ETH).
    pub const WEI_PER_ETH: i128 = 1_000_000_000_000_000_000;

    /// Basis points in a whole.
    pub const BASIS_POINTS: i64 = 10_000;

    /// Convert a summed smallest-unit balance to the unit of account.
    ///
    /// Only used at the read boundary; ledger state is never fractional.
    pub fn wei_to_eth(wei: i128) -> f64 {
        let whole = wei / WEI_PER_ETH;
        let frac = wei % WEI_PER_ETH;
        whole as f64 + frac as f64 / WEI_PER_ETH as f64
    }
}

/// Built-in module identifiers resolvable by the capability registry.
pub mod modules {
    pub const STORAGE_MEMORY: &str = "memory";
    pub const STORAGE_POSTGRES: &str = "postgres";
    pub const DATA_LOADER: &str = "data-loader";
    pub const PAYOUT_LOOP: &str = "payout-loop";
    pub const LEDGER_REPORTER: &str = "ledger-reporter";
}

/// Selection criteria keys interpreted by the built-in backends.
pub mod criteria {
    pub const CONNECTED: &str = "connected";
    pub const LIMIT: &str = "limit";
    pub const STRATEGY: &str = "strategy";
}
