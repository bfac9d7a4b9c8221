//! Nonce tracking for live and committed transactions.
//!
//! Two checkers cooperate to enforce replay protection:
//!
//! - [`PoolNonceChecker`] records the nonces of live, unconfirmed pool
//!   entries, keyed by sender.
//! - [`LedgerNonceChecker`] records the nonces of every committed batch,
//!   keyed by batch number, evicting whole batches once they fall out of the
//!   block-limit window.
//!
//! Nonces are globally unique strings; the sender key exists so that a
//! sender's live set can be inspected, while removal works from the nonce
//! alone.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use basalt_chain::{
    block::Height,
    transaction::{Nonce, Transaction},
    Address,
};

/// Records the nonces of live, unconfirmed pool transactions.
#[derive(Debug, Default)]
pub struct PoolNonceChecker {
    inner: RwLock<PoolNonceInner>,
}

#[derive(Debug, Default)]
struct PoolNonceInner {
    /// Live nonces grouped by sender.
    by_sender: HashMap<Address, HashSet<Nonce>>,
    /// Reverse index so removal works from the nonce alone.
    senders: HashMap<Nonce, Address>,
}

impl PoolNonceChecker {
    /// Returns true if the transaction's nonce duplicates a live entry from
    /// the same sender.
    pub fn contains(&self, transaction: &Transaction) -> bool {
        let inner = self.inner.read();
        inner
            .by_sender
            .get(&transaction.sender())
            .is_some_and(|nonces| nonces.contains(transaction.nonce()))
    }

    /// Records the nonce of a newly inserted pool entry.
    pub fn insert(&self, sender: Address, nonce: Nonce) {
        let mut inner = self.inner.write();
        inner.by_sender.entry(sender).or_default().insert(nonce.clone());
        inner.senders.insert(nonce, sender);
    }

    /// Forgets the given nonces, typically after their transactions left the
    /// pool.
    pub fn batch_remove<'a>(&self, nonces: impl IntoIterator<Item = &'a Nonce>) {
        let mut inner = self.inner.write();
        for nonce in nonces {
            let Some(sender) = inner.senders.remove(nonce) else {
                continue;
            };
            if let Some(sender_nonces) = inner.by_sender.get_mut(&sender) {
                sender_nonces.remove(nonce);
                if sender_nonces.is_empty() {
                    inner.by_sender.remove(&sender);
                }
            }
        }
    }

    /// The number of live nonces tracked.
    pub fn len(&self) -> usize {
        self.inner.read().senders.len()
    }

    /// Returns true if no live nonces are tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.read().senders.is_empty()
    }
}

/// Records the nonces of committed batches inside the block-limit window.
///
/// Batches older than the window are evicted wholesale on insert, so lookups
/// stay bounded by the window size regardless of chain length.
#[derive(Debug)]
pub struct LedgerNonceChecker {
    /// How many batches back a transaction's block limit may reach.
    block_limit_window: u64,
    inner: RwLock<LedgerNonceInner>,
}

#[derive(Debug, Default)]
struct LedgerNonceInner {
    /// Committed nonces in insertion order, keyed by batch number.
    batches: BTreeMap<u64, Vec<Nonce>>,
    /// The batch each committed nonce landed in.
    nonces: HashMap<Nonce, u64>,
    /// The highest committed batch number seen.
    latest: u64,
}

impl LedgerNonceChecker {
    /// Creates a checker evicting batches older than `block_limit_window`.
    pub fn new(block_limit_window: u64) -> Self {
        Self {
            block_limit_window,
            inner: RwLock::new(LedgerNonceInner::default()),
        }
    }

    /// Records the nonces of a committed batch and evicts batches that fell
    /// out of the window.
    pub fn batch_insert(&self, batch_id: Height, nonces: Vec<Nonce>) {
        let mut inner = self.inner.write();
        for nonce in &nonces {
            inner.nonces.insert(nonce.clone(), batch_id.0);
        }
        inner.batches.entry(batch_id.0).or_default().extend(nonces);
        if batch_id.0 > inner.latest {
            inner.latest = batch_id.0;
        }

        let horizon = inner.latest.saturating_sub(self.block_limit_window);
        loop {
            let Some(oldest) = inner.batches.keys().next().copied() else {
                break;
            };
            if oldest >= horizon {
                break;
            }
            let evicted = inner.batches.remove(&oldest).unwrap_or_default();
            for nonce in &evicted {
                // Only drop the reverse entry if a newer batch didn't re-map it.
                if inner.nonces.get(nonce) == Some(&oldest) {
                    inner.nonces.remove(nonce);
                }
            }
            debug!(batch = oldest, evicted = evicted.len(), "evicted ledger nonces");
        }
    }

    /// Returns true if the nonce was committed inside the window.
    pub fn contains(&self, nonce: &Nonce) -> bool {
        self.inner.read().nonces.contains_key(nonce)
    }

    /// The highest committed batch number seen.
    pub fn latest_batch(&self) -> Height {
        Height(self.inner.read().latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_transaction() -> Transaction {
        let key = ed25519_zebra::SigningKey::new(rand::thread_rng());
        Transaction::sign(
            1,
            "nonce-1".into(),
            Address([7; 20]),
            100_000,
            50,
            Vec::new(),
            0,
            false,
            &key,
        )
    }

    #[test]
    fn pool_checker_tracks_live_nonces() {
        let checker = PoolNonceChecker::default();
        let transaction = test_transaction();

        assert!(!checker.contains(&transaction));

        checker.insert(transaction.sender(), transaction.nonce().clone());
        assert!(checker.contains(&transaction));
        assert_eq!(checker.len(), 1);

        checker.batch_remove([transaction.nonce()]);
        assert!(!checker.contains(&transaction));
        assert!(checker.is_empty());
    }

    #[test]
    fn pool_checker_remove_is_idempotent() {
        let checker = PoolNonceChecker::default();
        let transaction = test_transaction();

        checker.insert(transaction.sender(), transaction.nonce().clone());
        checker.batch_remove([transaction.nonce()]);
        checker.batch_remove([transaction.nonce()]);
        assert!(checker.is_empty());
    }

    #[test]
    fn ledger_checker_finds_committed_nonces() {
        let checker = LedgerNonceChecker::new(100);
        checker.batch_insert(Height(7), vec!["1".into(), "2".into()]);

        assert!(checker.contains(&"1".into()));
        assert!(checker.contains(&"2".into()));
        assert!(!checker.contains(&"3".into()));
        assert_eq!(checker.latest_batch(), Height(7));
    }

    #[test]
    fn ledger_checker_evicts_batches_outside_the_window() {
        let checker = LedgerNonceChecker::new(10);
        checker.batch_insert(Height(1), vec!["old".into()]);
        checker.batch_insert(Height(20), vec!["new".into()]);

        assert!(!checker.contains(&"old".into()));
        assert!(checker.contains(&"new".into()));
    }
}
