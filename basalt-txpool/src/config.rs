//! User-configurable transaction pool parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transaction pool configuration section.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The maximum number of resident transactions.
    ///
    /// Client-sourced submissions are rejected with `TxPoolIsFull` once the
    /// pool holds this many transactions. Peer-sourced imports and enforced
    /// proposal inserts bypass the limit so that the network converges on a
    /// full set.
    pub pool_limit: usize,

    /// The number of worker tasks that fan out submit-result callbacks.
    ///
    /// Removing a committed batch can resolve many pending submissions at
    /// once; `start` spawns this many notifier workers so the dispatch does
    /// not run on the consensus thread.
    pub notify_worker_num: usize,

    /// How long a transaction may stay in the pool without being committed
    /// before the reaper retires it with `TransactionPoolTimeout`.
    pub tx_expiry_time: Duration,

    /// The delay between expiry sweeps of the reaper.
    pub cleanup_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_limit: 15_000,
            notify_worker_num: 2,
            tx_expiry_time: Duration::from_secs(10 * 60),
            cleanup_interval: Duration::from_secs(3),
        }
    }
}
