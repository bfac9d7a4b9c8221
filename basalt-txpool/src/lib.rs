//! The Basalt transaction pool.
//!
//! An in-memory store for candidate transactions shared by every worker
//! thread of the node. Transactions arrive from client submitters and peer
//! nodes, are validated and deduplicated, ripen in the pool, are handed to
//! block sealers on demand, transition sealed and unsealed as proposals
//! succeed or roll back, and leave exactly once: committed, expired, or
//! explicitly invalidated.
//!
//! The pool is not persistent (a restart discards it), does not order
//! fetches fairly, and never replaces a resident transaction: re-submission
//! of a known hash is rejected.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use basalt_txpool::{
//!     Config, LedgerNonceChecker, MemoryStorage, NotifyChannel, PoolNonceChecker, TxValidator,
//! };
//!
//! # async fn demo(transaction: basalt_chain::transaction::Transaction) {
//! let ledger_nonces = Arc::new(LedgerNonceChecker::new(1_000));
//! let pool_nonces = Arc::new(PoolNonceChecker::default());
//! let validator = Arc::new(TxValidator::new(1, 3_000_000, ledger_nonces, pool_nonces.clone()));
//!
//! let pool = MemoryStorage::new(Config::default(), validator, pool_nonces);
//! let (notifier, _unsealed_counts) = NotifyChannel::channel(8);
//! pool.set_unsealed_notifier(notifier);
//! pool.start();
//!
//! let result = pool.submit_transaction(transaction).await;
//! # let _ = result;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod nonce;
pub mod notifier;
mod reaper;
pub mod storage;
pub mod validator;

pub use config::Config;
pub use error::TxPoolError;
pub use nonce::{LedgerNonceChecker, PoolNonceChecker};
pub use notifier::{NotifyChannel, MAX_RETRY_NOTIFY_TIME};
pub use storage::{
    CleanupSwitch, MemoryStorage, PeerId, PoolEntry, MAX_KNOWN_PEERS, MAX_TRAVERSE_TXS_COUNT,
};
pub use validator::{TxValidator, Validator};
