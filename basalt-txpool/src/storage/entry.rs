//! Pool-owned transaction state.
//!
//! Once admitted, a transaction is wrapped in a [`PoolEntry`] and shared by
//! reference-counted handle between the table, in-flight sealers, and the
//! peer-knowledge filter. The payload is immutable; the pool-side fields are
//! individually atomic so concurrent readers holding the shared pool lock can
//! flip them without tearing.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use indexmap::IndexSet;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use basalt_chain::{
    block::ProposalId,
    transaction::{Hash, Nonce, SubmitResult, Transaction},
    Address,
};

use crate::error::TxPoolError;

/// How many peers a single entry remembers as already knowing it.
///
/// Oldest entries are evicted beyond this bound; re-gossiping to a forgotten
/// peer is wasteful but harmless.
pub const MAX_KNOWN_PEERS: usize = 128;

/// The identifier of a peer node.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PeerId(pub [u8; 32]);

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("PeerId")
            .field(&hex::encode(&self.0[..4]))
            .finish()
    }
}

/// The consume-once completion slot installed by `submit_transaction`.
pub(crate) type SubmitSender = oneshot::Sender<Result<SubmitResult, TxPoolError>>;

/// A resident transaction and its pool-side state.
pub struct PoolEntry {
    transaction: Transaction,
    /// Cached content hash; the table's primary key.
    hash: Hash,
    /// Cached sender address.
    sender: Address,
    /// Millisecond timestamp stamped when the pool admitted the entry.
    import_time: u64,

    /// True while a sealer has claimed this entry.
    sealed: AtomicBool,
    /// The proposal that claimed the entry; `None` while fetched but not yet
    /// marked, and always `None` while unsealed.
    proposal: Mutex<Option<ProposalId>>,
    /// True once the entry has been broadcast to peers.
    synced: AtomicBool,
    /// Sticky invalidation flag; never cleared once set.
    invalid: AtomicBool,
    /// Peers known to already have this transaction, oldest first.
    known_peers: Mutex<IndexSet<PeerId>>,
    /// At-most-one pending submitter completion, consumed on notify.
    submit_callback: Mutex<Option<SubmitSender>>,
}

impl PoolEntry {
    /// Wraps a transaction for residence in the pool, stamping its import
    /// time.
    pub fn new(transaction: Transaction, import_time: u64) -> Self {
        let hash = transaction.hash();
        let sender = transaction.sender();
        Self {
            transaction,
            hash,
            sender,
            import_time,
            sealed: AtomicBool::new(false),
            proposal: Mutex::new(None),
            synced: AtomicBool::new(false),
            invalid: AtomicBool::new(false),
            known_peers: Mutex::new(IndexSet::new()),
            submit_callback: Mutex::new(None),
        }
    }

    /// The wrapped transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// The cached content hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The cached sender address.
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// The transaction's nonce.
    pub fn nonce(&self) -> &Nonce {
        self.transaction.nonce()
    }

    /// The millisecond timestamp the pool admitted this entry.
    pub fn import_time(&self) -> u64 {
        self.import_time
    }

    /// Whether the entry outlived the expiry window at `now`.
    pub fn is_expired(&self, now: u64, expiry: Duration) -> bool {
        now > self.import_time.saturating_add(expiry.as_millis() as u64)
    }

    /// True while a sealer has claimed this entry.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Claims the entry for `proposal`, returning true if it was newly
    /// sealed (the caller adjusts the sealed counter on true).
    pub fn mark_sealed(&self, proposal: Option<ProposalId>) -> bool {
        let newly_sealed = self.set_sealed();
        *self.proposal.lock() = proposal;
        newly_sealed
    }

    /// Sets the seal flag without touching the recorded proposal, returning
    /// true if the entry was newly sealed.
    pub fn set_sealed(&self) -> bool {
        !self.sealed.swap(true, Ordering::AcqRel)
    }

    /// Releases the entry's seal and clears the claiming proposal, returning
    /// true if it was previously sealed.
    pub fn mark_unsealed(&self) -> bool {
        let was_sealed = self.sealed.swap(false, Ordering::AcqRel);
        *self.proposal.lock() = None;
        was_sealed
    }

    /// The proposal currently claiming this entry, if marked.
    pub fn proposal(&self) -> Option<ProposalId> {
        *self.proposal.lock()
    }

    /// True once the entry has been broadcast to peers.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Flags the entry as broadcast, returning its previous state.
    pub fn set_synced(&self) -> bool {
        self.synced.swap(true, Ordering::AcqRel)
    }

    /// The sticky invalidation flag.
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    /// Sets the sticky invalidation flag.
    pub fn set_invalid(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Records that `peer` already has this transaction, evicting the oldest
    /// record beyond [`MAX_KNOWN_PEERS`].
    pub fn append_known_peer(&self, peer: PeerId) {
        let mut known_peers = self.known_peers.lock();
        if known_peers.insert(peer) && known_peers.len() > MAX_KNOWN_PEERS {
            known_peers.shift_remove_index(0);
        }
    }

    /// Whether `peer` is known to already have this transaction.
    pub fn is_known_to(&self, peer: &PeerId) -> bool {
        self.known_peers.lock().contains(peer)
    }

    /// Installs the submitter completion slot.
    pub(crate) fn set_submit_callback(&self, callback: SubmitSender) {
        *self.submit_callback.lock() = Some(callback);
    }

    /// Takes the completion slot; the taker is responsible for invocation.
    pub(crate) fn take_submit_callback(&self) -> Option<SubmitSender> {
        self.submit_callback.lock().take()
    }

    /// Fires the submitter completion, if one is still pending.
    ///
    /// Tolerates dropped submission handles: sending into a dropped channel
    /// is ignored.
    pub fn notify_result(&self, result: Result<SubmitResult, TxPoolError>) {
        if let Some(callback) = self.take_submit_callback() {
            let _ = callback.send(result);
        }
    }
}

impl std::fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("hash", &self.hash)
            .field("sealed", &self.is_sealed())
            .field("proposal", &self.proposal())
            .field("synced", &self.is_synced())
            .field("invalid", &self.is_invalid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use basalt_chain::block::{Hash as BlockHash, Height};

    fn entry() -> PoolEntry {
        let key = ed25519_zebra::SigningKey::new(rand::thread_rng());
        let transaction = Transaction::sign(
            1,
            "1".into(),
            Address([1; 20]),
            100_000,
            100,
            Vec::new(),
            0,
            false,
            &key,
        );
        PoolEntry::new(transaction, 1_000)
    }

    #[test]
    fn seal_transitions_report_counter_deltas() {
        let entry = entry();
        let proposal = ProposalId::new(Height(3), BlockHash([0xde; 32]));

        assert!(entry.mark_sealed(Some(proposal)));
        assert!(entry.is_sealed());
        assert_eq!(entry.proposal(), Some(proposal));

        // Re-sealing is not a transition.
        assert!(!entry.mark_sealed(Some(proposal)));

        assert!(entry.mark_unsealed());
        assert!(!entry.is_sealed());
        assert_eq!(entry.proposal(), None);

        // Double unseal is not a transition either.
        assert!(!entry.mark_unsealed());
    }

    #[test]
    fn known_peers_are_bounded_and_evict_oldest() {
        let entry = entry();

        for index in 0..=MAX_KNOWN_PEERS {
            entry.append_known_peer(PeerId([index as u8; 32]));
        }

        assert!(!entry.is_known_to(&PeerId([0; 32])));
        assert!(entry.is_known_to(&PeerId([MAX_KNOWN_PEERS as u8; 32])));
    }

    #[test]
    fn submit_callback_is_consumed_once() {
        let entry = entry();
        let (sender, mut receiver) = oneshot::channel();
        entry.set_submit_callback(sender);

        assert!(entry.take_submit_callback().is_some());
        assert!(entry.take_submit_callback().is_none());

        // The taker dropped the slot without sending.
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn invalidation_is_sticky() {
        let entry = entry();
        assert!(!entry.is_invalid());
        entry.set_invalid();
        assert!(entry.is_invalid());
        entry.set_invalid();
        assert!(entry.is_invalid());
    }

    #[test]
    fn expiry_uses_the_import_timestamp() {
        let entry = entry();
        let expiry = Duration::from_millis(100);

        assert!(!entry.is_expired(1_050, expiry));
        assert!(!entry.is_expired(1_100, expiry));
        assert!(entry.is_expired(1_101, expiry));
    }
}
