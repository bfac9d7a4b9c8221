//! The in-memory transaction table and its state transitions.
//!
//! [`MemoryStorage`] is shared by every worker thread of the node: RPC
//! submitters, peer importers, the consensus engine, sealers, and the expiry
//! reaper all contend on it. Structural changes to the table (inserting and
//! removing keys, clearing) go through a reader/writer lock; the pool-side
//! state of individual entries is atomic at the field level, so flag flips
//! ride the shared lock.
//!
//! Lock order: the pool lock before the missed-transactions lock, the
//! invalidation staging locks and per-entry locks innermost. Submit
//! callbacks, result notifications, and unsealed-count notifications always
//! fire after every lock is released.

use std::{
    collections::{hash_map, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

use basalt_chain::{
    block::{Header, Height, ProposalId},
    transaction::{
        Hash, Nonce, SubmitResult, Transaction, TransactionMetaData, TransactionStatus,
    },
};

use crate::{
    config::Config,
    error::TxPoolError,
    nonce::PoolNonceChecker,
    notifier::{NotifyChannel, ResultNotifierPool},
    reaper::{Reaper, ReaperHandle},
    validator::Validator,
};

pub mod entry;

pub use entry::{PeerId, PoolEntry, MAX_KNOWN_PEERS};

use entry::SubmitSender;


/// The per-sweep traversal budget of the expiry reaper, bounding how long a
/// single tick can hold the pool lock against submitters.
pub const MAX_TRAVERSE_TXS_COUNT: usize = 10_000;

/// A predicate consensus nodes install to bypass timer-driven cleanup while
/// they retire expired entries on the sealing path instead.
pub type CleanupSwitch = Arc<dyn Fn() -> bool + Send + Sync>;

type TxsTable = HashMap<Hash, Arc<PoolEntry>>;

/// The in-memory transaction pool store.
pub struct MemoryStorage {
    config: Config,
    validator: Arc<dyn Validator>,
    pool_nonce_checker: Arc<PoolNonceChecker>,

    /// Primary index: content hash to entry.
    txs: RwLock<TxsTable>,
    /// Hashes staged for removal at the next checkpoint.
    invalid_txs: Mutex<HashSet<Hash>>,
    /// Nonces of staged entries, forgotten alongside them.
    invalid_nonces: Mutex<HashSet<Nonce>>,
    /// Hashes known to peers but not to us, bounding duplicate fetches.
    missed_txs: RwLock<HashSet<Hash>>,

    /// Count of sealed resident entries, maintained incrementally.
    sealed_txs_size: AtomicUsize,
    /// The last committed batch number.
    block_number: AtomicU64,
    /// Wall clock (ms) of the last committed batch.
    block_number_updated_time: AtomicU64,
    /// Wall clock (ms) the current TPS measurement started, 0 when idle.
    tps_stat_start_time: AtomicU64,
    /// Transactions committed since the TPS measurement started.
    on_chain_txs_count: AtomicU64,

    /// The unsealed-count pipe, if the embedding node installed one.
    notifier: RwLock<Option<NotifyChannel>>,
    /// Cleanup bypass predicate, if installed.
    cleanup_switch: RwLock<Option<CleanupSwitch>>,
    /// The running reaper task, between `start` and `stop`.
    reaper: Mutex<Option<ReaperHandle>>,
    /// The submit-result fan-out workers, between `start` and `stop`.
    result_notifiers: RwLock<Option<ResultNotifierPool>>,

    /// Back-reference handed to retry tasks and the reaper, so they abort
    /// once the pool is dropped.
    weak_self: Weak<MemoryStorage>,
}

impl MemoryStorage {
    /// Creates a pool store with the given collaborators.
    ///
    /// The store is inert until [`start`](Self::start) spawns the reaper.
    pub fn new(
        config: Config,
        validator: Arc<dyn Validator>,
        pool_nonce_checker: Arc<PoolNonceChecker>,
    ) -> Arc<Self> {
        info!(
            pool_limit = config.pool_limit,
            tx_expiry_time = ?config.tx_expiry_time,
            notify_worker_num = config.notify_worker_num,
            "initializing transaction pool storage"
        );
        Arc::new_cyclic(|weak_self| MemoryStorage {
            config,
            validator,
            pool_nonce_checker,
            txs: RwLock::new(HashMap::new()),
            invalid_txs: Mutex::new(HashSet::new()),
            invalid_nonces: Mutex::new(HashSet::new()),
            missed_txs: RwLock::new(HashSet::new()),
            sealed_txs_size: AtomicUsize::new(0),
            block_number: AtomicU64::new(0),
            block_number_updated_time: AtomicU64::new(utc_now_ms()),
            tps_stat_start_time: AtomicU64::new(0),
            on_chain_txs_count: AtomicU64::new(0),
            notifier: RwLock::new(None),
            cleanup_switch: RwLock::new(None),
            reaper: Mutex::new(None),
            result_notifiers: RwLock::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Installs the unsealed-count notification channel.
    pub fn set_unsealed_notifier(&self, notifier: NotifyChannel) {
        *self.notifier.write() = Some(notifier);
    }

    /// Installs the cleanup bypass predicate.
    pub fn set_cleanup_switch(&self, switch: CleanupSwitch) {
        *self.cleanup_switch.write() = Some(switch);
    }

    /// Spawns the expiry reaper and the submit-result notifier workers.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut reaper = self.reaper.lock();
        if reaper.is_some() {
            warn!("transaction pool is already started");
            return;
        }
        *self.result_notifiers.write() =
            Some(ResultNotifierPool::spawn(self.config.notify_worker_num));
        *reaper = Some(Reaper::spawn(
            Arc::downgrade(self),
            self.config.cleanup_interval,
        ));
    }

    /// Stops the reaper and the notifier workers, waiting for an in-flight
    /// sweep to drain and queued result notifications to deliver.
    pub async fn stop(&self) {
        let Some(handle) = self.reaper.lock().take() else {
            return;
        };
        handle.stop().await;
        if let Some(notifiers) = self.result_notifiers.write().take() {
            notifiers.stop().await;
        }
        info!("stopped transaction pool");
    }

    // === Submission path ===

    /// Submits a client transaction and waits for its terminal result.
    ///
    /// Resolves either synchronously with a rejection, or asynchronously when
    /// the transaction's lifecycle ends: committed through
    /// [`batch_remove`](Self::batch_remove) (status `None`), or retired by
    /// the reaper (status `TransactionPoolTimeout`). Dropping the returned
    /// future leaks the notify slot until the pool fires it into the dropped
    /// channel, which is tolerated.
    #[instrument(skip(self, transaction), fields(tx = %transaction.hash().abridged()))]
    pub async fn submit_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<SubmitResult, TxPoolError> {
        let entry = Arc::new(PoolEntry::new(transaction, utc_now_ms()));
        let (callback, receiver) = oneshot::channel();

        if let Err(rejection) = self.verify_and_submit(entry, Some(callback), true) {
            debug!(%rejection, "rejected transaction submission");
            return Err(rejection);
        }
        self.notify_unsealed_txs_size();

        // The suspension point: resumed by batch_remove, the reaper, or an
        // explicit invalidation. A sender lost without a result means the
        // pool dropped the entry (for example through `clear`).
        receiver.await.unwrap_or(Err(TxPoolError::Dropped))
    }

    /// Bulk import of peer-gossiped transactions.
    ///
    /// Skips the pool capacity check so the network converges on a full set.
    /// Returns the number of transactions admitted.
    pub fn batch_import_txs(&self, transactions: Vec<Transaction>) -> usize {
        let start = Instant::now();
        let total = transactions.len();
        let mut imported = 0_usize;
        for transaction in transactions {
            let entry = Arc::new(PoolEntry::new(transaction, utc_now_ms()));
            let hash = entry.hash();
            match self.verify_and_submit(entry, None, false) {
                Ok(()) => imported += 1,
                Err(rejection) => {
                    trace!(tx = %hash.abridged(), %rejection, "skipped imported transaction")
                }
            }
        }
        self.notify_unsealed_txs_size();
        debug!(
            imported,
            total,
            pending = self.len(),
            elapsed = ?start.elapsed(),
            "imported peer transactions"
        );
        imported
    }

    /// Admits transactions fetched in response to an earlier miss report and
    /// clears their hashes from the missed set.
    ///
    /// The fetch path verified these transactions; duplicates keep the
    /// resident entry.
    pub fn batch_insert(&self, transactions: Vec<Transaction>) {
        let mut hashes = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let entry = Arc::new(PoolEntry::new(transaction, utc_now_ms()));
            hashes.push(entry.hash());
            let _ = self.insert(entry);
        }
        {
            let mut missed_txs = self.missed_txs.write();
            for hash in &hashes {
                missed_txs.remove(hash);
            }
        }
        self.notify_unsealed_txs_size();
    }

    fn verify_and_submit(
        &self,
        entry: Arc<PoolEntry>,
        callback: Option<SubmitSender>,
        check_pool_limit: bool,
    ) -> Result<(), TxPoolError> {
        let tx_count = {
            let txs = self.txs.read();
            if txs.contains_key(&entry.hash()) {
                return Err(TxPoolError::AlreadyInTxPool);
            }
            txs.len()
        };

        // Start the TPS meter when a transaction reaches an empty pool. The
        // stamp can race a concurrent insert, which only skews the sample,
        // never pool state.
        if tx_count == 0 {
            let _ = self.tps_stat_start_time.compare_exchange(
                0,
                utc_now_ms(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        if check_pool_limit && tx_count >= self.config.pool_limit {
            return Err(TxPoolError::TxPoolIsFull);
        }

        if let Err(status) = self.validator.verify(entry.transaction()) {
            // A concurrent submission of the same transaction can land its
            // nonce first; report that as the duplicate it is.
            if status == TransactionStatus::NonceCheckFail && self.contains(&entry.hash()) {
                return Err(TxPoolError::AlreadyInTxPool);
            }
            return Err(status.into());
        }

        if let Some(callback) = callback {
            entry.set_submit_callback(callback);
        }
        self.insert(entry)
    }

    fn insert(&self, entry: Arc<PoolEntry>) -> Result<(), TxPoolError> {
        let hash = entry.hash();
        {
            let mut txs = self.txs.write();
            match txs.entry(hash) {
                hash_map::Entry::Occupied(_) => return Err(TxPoolError::AlreadyInTxPool),
                hash_map::Entry::Vacant(slot) => {
                    self.pool_nonce_checker
                        .insert(entry.sender(), entry.nonce().clone());
                    slot.insert(entry);
                }
            }
        }
        metrics::counter!("txpool.inserted.transactions.total").increment(1);
        Ok(())
    }

    // === Enforced insertion (consensus path) ===

    /// Atomically accepts all of a peer proposal's transactions, or reports
    /// failure so consensus rolls the proposal back.
    ///
    /// Holds the exclusive lock across the whole batch. Partial inserts are
    /// not unrolled; the consensus layer owns the rollback.
    #[instrument(skip(self, transactions), fields(proposal = %header.proposal_id(), txs = transactions.len()))]
    pub fn batch_verify_and_submit(&self, header: &Header, transactions: &[Transaction]) -> bool {
        let start = Instant::now();
        let proposal = header.proposal_id();

        let accepted = {
            let mut txs = self.txs.write();
            transactions.iter().all(|transaction| {
                match self.enforce_submit(&mut txs, transaction, proposal) {
                    Ok(()) => true,
                    Err(status) => {
                        warn!(
                            tx = %transaction.hash().abridged(),
                            %status,
                            "proposal transaction verification failed"
                        );
                        false
                    }
                }
            })
        };

        self.notify_unsealed_txs_size();
        debug!(accepted, elapsed = ?start.elapsed(), "verified proposal transactions");
        accepted
    }

    /// Accepts a single proposal transaction under the already-held
    /// exclusive lock.
    fn enforce_submit(
        &self,
        table: &mut TxsTable,
        transaction: &Transaction,
        proposal: ProposalId,
    ) -> Result<(), TransactionStatus> {
        let hash = transaction.hash();
        let existing = table.get(&hash).cloned();

        // An already-committed transaction can never be sealed again.
        if self.validator.submitted_to_chain(transaction)
            == Err(TransactionStatus::NonceCheckFail)
        {
            if let Some(entry) = &existing {
                warn!(
                    tx = %hash.abridged(),
                    current = ?entry.proposal(),
                    requested = %proposal,
                    "enforced seal failed: nonce check"
                );
            }
            return Err(TransactionStatus::NonceCheckFail);
        }

        if let Some(entry) = existing {
            // Unsealed, or fetched locally but not yet claimed by any
            // proposal: claim it for this one.
            if !entry.is_sealed() || entry.proposal().is_none() {
                if entry.mark_sealed(Some(proposal)) {
                    self.sealed_txs_size.fetch_add(1, Ordering::AcqRel);
                }
                trace!(tx = %hash.abridged(), %proposal, "enforced seal");
                return Ok(());
            }
            if entry.proposal() == Some(proposal) {
                return Ok(());
            }
            warn!(
                tx = %hash.abridged(),
                current = ?entry.proposal(),
                requested = %proposal,
                "enforced seal failed: claimed by another proposal"
            );
            return Err(TransactionStatus::AlreadyInTxPool);
        }

        // Absent: proposals must be admitted, so capacity checks don't apply.
        let entry = Arc::new(PoolEntry::new(transaction.clone(), utc_now_ms()));
        if entry.mark_sealed(Some(proposal)) {
            self.sealed_txs_size.fetch_add(1, Ordering::AcqRel);
        }
        self.pool_nonce_checker
            .insert(entry.sender(), entry.nonce().clone());
        table.insert(hash, entry);
        metrics::counter!("txpool.inserted.transactions.total").increment(1);
        Ok(())
    }

    // === Fetch & seal path ===

    /// Picks up to `limit` seal candidates, marking them sealed with the
    /// claiming proposal cleared (the sealer records it later through
    /// [`batch_mark_txs`](Self::batch_mark_txs)).
    ///
    /// Returns `(user, system)` metadata lists whose combined length is
    /// capped by `limit`. Entries in `avoid` are skipped; with
    /// `avoid_duplicate`, already-sealed entries are too. Expired and
    /// no-longer-committable entries found along the way are retired before
    /// returning.
    pub fn batch_fetch_txs(
        &self,
        limit: usize,
        avoid: &HashSet<Hash>,
        avoid_duplicate: bool,
    ) -> (Vec<TransactionMetaData>, Vec<TransactionMetaData>) {
        let start = Instant::now();
        let now = utc_now_ms();
        let mut txs_list = Vec::new();
        let mut sys_txs_list = Vec::new();

        let table = self.txs.upgradable_read();
        let lock_elapsed = start.elapsed();
        debug!(pending = table.len(), limit, "fetching seal candidates");

        {
            let mut invalid_txs = self.invalid_txs.lock();
            let mut invalid_nonces = self.invalid_nonces.lock();

            for (hash, entry) in table.iter() {
                if entry.is_invalid() || invalid_txs.contains(hash) {
                    continue;
                }
                // Already sealed for a newer proposal.
                if avoid_duplicate && entry.is_sealed() {
                    continue;
                }
                if entry.is_expired(now, self.config.tx_expiry_time) {
                    invalid_txs.insert(*hash);
                    invalid_nonces.insert(entry.nonce().clone());
                    continue;
                }
                // Nonces were valid on import, so a failure here means the
                // transaction committed (or its window expired) while
                // resident.
                match self.validator.submitted_to_chain(entry.transaction()) {
                    Err(TransactionStatus::NonceCheckFail) => {
                        // Committed on another path: consume the callback so
                        // retiring the entry doesn't notify a second time.
                        drop(entry.take_submit_callback());
                        invalid_txs.insert(*hash);
                        invalid_nonces.insert(entry.nonce().clone());
                        continue;
                    }
                    Err(TransactionStatus::BlockLimitCheckFail) => {
                        invalid_txs.insert(*hash);
                        invalid_nonces.insert(entry.nonce().clone());
                        continue;
                    }
                    _ => {}
                }
                if avoid.contains(hash) {
                    continue;
                }

                let transaction = entry.transaction();
                let meta = TransactionMetaData {
                    hash: *hash,
                    to: transaction.to(),
                    attribute: transaction.attribute(),
                };
                if transaction.is_system() {
                    sys_txs_list.push(meta);
                } else {
                    txs_list.push(meta);
                }
                if entry.mark_sealed(None) {
                    self.sealed_txs_size.fetch_add(1, Ordering::AcqRel);
                }
                if txs_list.len() + sys_txs_list.len() >= limit {
                    break;
                }
            }
        }

        let mut table = RwLockUpgradableReadGuard::upgrade(table);
        let notifications = self.remove_invalid_txs(&mut table);
        let pending = table.len();
        drop(table);

        self.notify_tx_results(notifications);
        self.notify_unsealed_txs_size();
        info!(
            txs = txs_list.len(),
            sys_txs = sys_txs_list.len(),
            pending,
            limit,
            elapsed = ?start.elapsed(),
            ?lock_elapsed,
            "fetched seal candidates"
        );
        (txs_list, sys_txs_list)
    }

    /// Resolves peer-requested hashes to resident entries, reporting misses.
    pub fn fetch_txs(&self, hashes: &[Hash]) -> (Vec<Arc<PoolEntry>>, Vec<Hash>) {
        let table = self.txs.read();
        let mut fetched = Vec::with_capacity(hashes.len());
        let mut missed = Vec::new();
        for hash in hashes {
            match table.get(hash) {
                Some(entry) => fetched.push(entry.clone()),
                None => missed.push(*hash),
            }
        }
        for hash in &missed {
            trace!(tx = %hash.abridged(), "miss");
        }
        (fetched, missed)
    }

    /// Collects up to `limit` entries not yet broadcast to peers, marking
    /// them broadcast.
    pub fn fetch_new_txs(&self, limit: usize) -> Vec<Arc<PoolEntry>> {
        let table = self.txs.read();
        let mut fetched = Vec::new();
        for entry in table.values() {
            if entry.set_synced() {
                continue;
            }
            fetched.push(entry.clone());
            if fetched.len() >= limit {
                break;
            }
        }
        fetched
    }

    // === Seal-flag transitions ===

    /// Applies a uniform seal flag to the given hashes.
    ///
    /// Sealing is optimistic (shared lock: concurrent sealers mark disjoint
    /// sets); unsealing is pessimistic (exclusive lock, so two consensus
    /// paths reverting the same proposal cannot race a double unseal). An
    /// unseal request for an entry meanwhile claimed by a different proposal
    /// is stale and skipped.
    pub fn batch_mark_txs(&self, hashes: &[Hash], proposal: ProposalId, seal_flag: bool) {
        if seal_flag {
            let table = self.txs.read();
            self.batch_mark_txs_with_table(&table, hashes, proposal, seal_flag);
        } else {
            let table = self.txs.write();
            self.batch_mark_txs_with_table(&table, hashes, proposal, seal_flag);
        }
        self.notify_unsealed_txs_size();
    }

    fn batch_mark_txs_with_table(
        &self,
        table: &TxsTable,
        hashes: &[Hash],
        proposal: ProposalId,
        seal_flag: bool,
    ) {
        let start = Instant::now();
        let mut marked = 0_usize;
        for hash in hashes {
            let Some(entry) = table.get(hash) else {
                trace!(tx = %hash.abridged(), seal_flag, "marking a missing transaction, skipped");
                continue;
            };
            if !seal_flag
                && entry.is_sealed()
                && entry.proposal().is_some_and(|current| current != proposal)
            {
                // Re-sealed for a newer proposal; this unseal request is stale.
                continue;
            }
            if seal_flag {
                if entry.mark_sealed(Some(proposal)) {
                    self.sealed_txs_size.fetch_add(1, Ordering::AcqRel);
                }
            } else if entry.mark_unsealed() {
                self.decrement_sealed_count();
            }
            marked += 1;
        }
        debug!(
            requested = hashes.len(),
            marked,
            %proposal,
            seal_flag,
            elapsed = ?start.elapsed(),
            "marked seal flags"
        );
    }

    /// Applies a uniform seal flag to the whole table.
    ///
    /// Unsealing clears every claiming proposal; sealing leaves recorded
    /// proposals in place.
    pub fn batch_mark_all_txs(&self, seal_flag: bool) {
        {
            let table = self.txs.read();
            for entry in table.values() {
                if seal_flag {
                    entry.set_sealed();
                } else {
                    entry.mark_unsealed();
                }
            }
            let sealed = if seal_flag { table.len() } else { 0 };
            self.sealed_txs_size.store(sealed, Ordering::Release);
        }
        self.notify_unsealed_txs_size();
    }

    // === Removal path ===

    /// Removes a committed batch's transactions and fires their submitter
    /// callbacks.
    ///
    /// Results whose transactions the pool never held still feed the ledger
    /// nonce checker, so it learns of orphan commits. Callbacks fire last,
    /// with no lock held, so submitters observe updated counters and nonce
    /// state.
    #[instrument(skip(self, results), fields(batch = %batch_id, txs = results.len()))]
    pub fn batch_remove(&self, batch_id: Height, results: Vec<SubmitResult>) {
        let start = Instant::now();
        self.block_number_updated_time
            .store(utc_now_ms(), Ordering::Release);

        let results_len = results.len();
        let mut nonces = Vec::with_capacity(results_len);
        let mut notifications = Vec::with_capacity(results_len);
        let mut removed = 0_usize;

        let lock_elapsed = {
            let mut table = self.txs.write();
            let lock_start = Instant::now();
            for result in results {
                match self.remove_from_table(&mut table, &result.tx_hash) {
                    Some(entry) => {
                        removed += 1;
                        nonces.push(entry.nonce().clone());
                        notifications.push((Some(entry), result));
                    }
                    None => {
                        if !result.nonce.is_empty() {
                            nonces.push(result.nonce.clone());
                        }
                        notifications.push((None, result));
                    }
                }
            }
            if batch_id.0 > self.block_number.load(Ordering::Acquire) {
                self.block_number.store(batch_id.0, Ordering::Release);
            }
            lock_start.elapsed()
        };

        self.on_chain_txs_count
            .fetch_add(results_len as u64, Ordering::AcqRel);
        self.maybe_emit_tps_sample();

        self.notify_unsealed_txs_size();

        self.validator
            .ledger_nonce_checker()
            .batch_insert(batch_id, nonces.clone());
        self.pool_nonce_checker.batch_remove(nonces.iter());

        let mut notified = 0_usize;
        for (entry, result) in notifications {
            let Some(entry) = entry else { continue };
            self.dispatch_result(entry, result);
            notified += 1;
        }

        metrics::counter!("txpool.removed.transactions.total").increment(removed as u64);
        info!(
            expected = results_len,
            removed,
            notified,
            elapsed = ?start.elapsed(),
            ?lock_elapsed,
            "removed committed batch"
        );
    }

    /// Removes a single entry without notifying its submitter.
    pub fn remove(&self, hash: &Hash) -> Option<Arc<PoolEntry>> {
        let entry = {
            let mut table = self.txs.write();
            self.remove_from_table(&mut table, hash)
        };
        self.notify_unsealed_txs_size();
        entry
    }

    /// Removes a single entry and delivers the given result to its
    /// submitter.
    pub fn remove_submitted_tx(&self, result: SubmitResult) -> Option<Arc<PoolEntry>> {
        let entry = self.remove(&result.tx_hash)?;
        self.dispatch_result(entry.clone(), result);
        Some(entry)
    }

    fn remove_from_table(&self, table: &mut TxsTable, hash: &Hash) -> Option<Arc<PoolEntry>> {
        let entry = table.remove(hash)?;
        if entry.is_sealed() {
            self.decrement_sealed_count();
        }
        Some(entry)
    }

    /// Drains the staged invalidations under the exclusive lock, returning
    /// the submitter notifications for the caller to fire after unlocking.
    fn remove_invalid_txs(&self, table: &mut TxsTable) -> Vec<(Arc<PoolEntry>, SubmitResult)> {
        let staged: Vec<Hash> = std::mem::take(&mut *self.invalid_txs.lock())
            .into_iter()
            .collect();
        let staged_nonces = std::mem::take(&mut *self.invalid_nonces.lock());
        if staged.is_empty() && staged_nonces.is_empty() {
            return Vec::new();
        }

        let mut notifications = Vec::with_capacity(staged.len());
        for hash in &staged {
            let Some(entry) = self.remove_from_table(table, hash) else {
                continue;
            };
            entry.set_invalid();
            let result = SubmitResult::with_status(
                *hash,
                entry.nonce().clone(),
                TransactionStatus::TransactionPoolTimeout,
            );
            notifications.push((entry, result));
        }
        self.pool_nonce_checker.batch_remove(staged_nonces.iter());

        debug!(staged = staged.len(), removed = notifications.len(), "removed invalid transactions");
        metrics::counter!("txpool.expired.transactions.total")
            .increment(notifications.len() as u64);
        notifications
    }

    /// Fills sender and recipient from the entry, then delivers each result
    /// to its submitter. Must be called with no pool lock held.
    fn notify_tx_results(&self, notifications: Vec<(Arc<PoolEntry>, SubmitResult)>) {
        for (entry, result) in notifications {
            self.dispatch_result(entry, result);
        }
    }

    /// Delivers one terminal result to its submitter: through the notifier
    /// workers when they are running, synchronously otherwise.
    fn dispatch_result(&self, entry: Arc<PoolEntry>, mut result: SubmitResult) {
        result.sender = Some(entry.sender());
        result.to = Some(entry.transaction().to());

        let notification = match self.result_notifiers.read().as_ref() {
            Some(notifiers) => match notifiers.dispatch((entry, result)) {
                Ok(()) => return,
                Err(rejected) => rejected,
            },
            None => (entry, result),
        };
        let (entry, result) = notification;
        entry.notify_result(Ok(result));
    }

    /// Clears the pool, dropping all entries and staged state.
    ///
    /// Pending submitters resolve with a `Dropped` error when their notify
    /// slots are released.
    pub fn clear(&self) {
        {
            let mut table = self.txs.write();
            table.clear();
            self.invalid_txs.lock().clear();
            self.invalid_nonces.lock().clear();
            self.sealed_txs_size.store(0, Ordering::Release);
        }
        self.missed_txs.write().clear();
        self.notify_unsealed_txs_size();
    }

    // === Expiry sweep ===

    /// One reaper tick: stage entries violating the expiry bound, then
    /// retire them.
    ///
    /// Entries sealed for a proposal at or above the committed batch number
    /// are shielded; a bounded traversal keeps a tick from stalling
    /// submitters.
    pub fn clean_up_expired_transactions(&self) {
        if let Some(switch) = self.cleanup_switch.read().clone() {
            // Consensus nodes retire expired entries on the sealing path.
            if !switch() {
                return;
            }
        }

        let now = utc_now_ms();
        let notifications = {
            let table = self.txs.upgradable_read();
            if table.is_empty() {
                return;
            }

            let block_number = self.block_number.load(Ordering::Acquire);
            let mut traversed = 0_usize;
            let mut staged = 0_usize;
            {
                let mut invalid_txs = self.invalid_txs.lock();
                let mut invalid_nonces = self.invalid_nonces.lock();
                for (hash, entry) in table.iter() {
                    traversed += 1;
                    if traversed > MAX_TRAVERSE_TXS_COUNT {
                        break;
                    }
                    if entry.is_invalid() || invalid_txs.contains(hash) {
                        continue;
                    }
                    if entry.is_sealed()
                        && entry
                            .proposal()
                            .is_some_and(|proposal| proposal.number.0 >= block_number)
                    {
                        continue;
                    }
                    if entry.is_expired(now, self.config.tx_expiry_time) {
                        invalid_txs.insert(*hash);
                        invalid_nonces.insert(entry.nonce().clone());
                        staged += 1;
                    }
                }
            }
            debug!(pending = table.len(), traversed, staged, "swept expired transactions");

            let mut table = RwLockUpgradableReadGuard::upgrade(table);
            self.remove_invalid_txs(&mut table)
        };

        self.notify_tx_results(notifications);
        self.notify_unsealed_txs_size();
    }

    // === Peer-knowledge filter ===

    /// Marks resident hashes as known to `peer` and returns the hashes this
    /// node is missing and has not already requested.
    ///
    /// The missed set is cleared once it reaches the pool limit, accepting
    /// that a few known-missing transactions may be re-requested.
    pub fn filter_unknown_txs(&self, hashes: &[Hash], peer: PeerId) -> Vec<Hash> {
        let table = self.txs.read();
        for hash in hashes {
            if let Some(entry) = table.get(hash) {
                entry.append_known_peer(peer);
            }
        }

        let mut unknown = Vec::new();
        let mut missed_txs = self.missed_txs.write();
        for hash in hashes {
            if table.contains_key(hash) {
                continue;
            }
            if !missed_txs.insert(*hash) {
                continue;
            }
            unknown.push(*hash);
        }
        if missed_txs.len() >= self.config.pool_limit {
            missed_txs.clear();
        }

        metrics::counter!("txpool.gossip.suppressed.total")
            .increment((hashes.len() - unknown.len()) as u64);
        unknown
    }

    // === Proposal availability ===

    /// Returns the hashes of a proposal the pool does not hold.
    pub fn missing_proposal_txs(&self, header: &Header, hashes: &[Hash]) -> Vec<Hash> {
        if hashes.is_empty() {
            return Vec::new();
        }
        let start = Instant::now();
        let table = self.txs.read();
        let missing: Vec<Hash> = hashes
            .iter()
            .filter(|hash| !table.contains_key(hash))
            .copied()
            .collect();
        info!(
            proposal = %header.proposal_id(),
            txs = hashes.len(),
            missing = missing.len(),
            elapsed = ?start.elapsed(),
            "verified proposal availability"
        );
        missing
    }

    /// Returns true if the pool holds every one of the given hashes.
    pub fn proposal_txs_known(&self, hashes: &[Hash]) -> bool {
        let table = self.txs.read();
        hashes.iter().all(|hash| table.contains_key(hash))
    }

    // === Queries ===

    /// The number of resident transactions.
    pub fn len(&self) -> usize {
        self.txs.read().len()
    }

    /// Returns true if the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.txs.read().is_empty()
    }

    /// Returns true if the pool holds the given hash.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.txs.read().contains_key(hash)
    }

    /// Up to `limit` resident hashes, in table order. Debug aid.
    pub fn tx_hashes(&self, limit: usize) -> Vec<Hash> {
        self.txs.read().keys().take(limit).copied().collect()
    }

    /// The number of resident transactions no sealer has claimed.
    pub fn unsealed_txs_size(&self) -> usize {
        let tx_count = self.txs.read().len();
        self.unsealed_count(tx_count)
    }

    /// The last committed batch number.
    pub fn block_number(&self) -> Height {
        Height(self.block_number.load(Ordering::Acquire))
    }

    fn unsealed_count(&self, tx_count: usize) -> usize {
        let sealed = self.sealed_txs_size.load(Ordering::Acquire);
        if tx_count < sealed {
            // Drift means a bookkeeping bug; repair rather than underflow.
            debug_assert!(
                false,
                "sealed counter exceeds table size: {sealed} > {tx_count}"
            );
            warn!(sealed, tx_count, "sealed counter drift, repairing");
            self.sealed_txs_size.store(tx_count, Ordering::Release);
            return 0;
        }
        tx_count - sealed
    }

    fn decrement_sealed_count(&self) {
        let _ = self
            .sealed_txs_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |sealed| {
                Some(sealed.saturating_sub(1))
            });
    }

    // === Notifications & metrics ===

    /// Reports the current unsealed count to the installed channel.
    ///
    /// Must be called with no pool lock held: it re-reads the table size and
    /// hands off to the notifier, which may spawn a retry task holding only
    /// a weak reference to this storage.
    fn notify_unsealed_txs_size(&self) {
        let tx_count = self.txs.read().len();
        let unsealed = self.unsealed_count(tx_count);
        metrics::gauge!("txpool.size").set(tx_count as f64);
        metrics::gauge!("txpool.unsealed.size").set(unsealed as f64);

        let Some(notifier) = self.notifier.read().clone() else {
            return;
        };
        let weak = self.weak_self.clone();
        notifier.notify(unsealed, move || {
            weak.upgrade().map(|storage| storage.unsealed_txs_size())
        });
    }

    /// Emits a TPS sample and resets the meter once the pool drains.
    fn maybe_emit_tps_sample(&self) {
        let started = self.tps_stat_start_time.load(Ordering::Acquire);
        if started == 0 {
            return;
        }
        // The emptiness probe takes the read lock, so a concurrent insert
        // cannot trigger a spurious reset.
        if !self.txs.read().is_empty() {
            return;
        }

        let total_time = utc_now_ms().saturating_sub(started);
        let on_chain = self.on_chain_txs_count.load(Ordering::Acquire);
        if total_time > 0 {
            let tps = on_chain * 1000 / total_time;
            info!(tps, total_time, on_chain, "transaction throughput sample");
            metrics::gauge!("txpool.tps").set(tps as f64);
        }
        self.tps_stat_start_time.store(0, Ordering::Release);
        self.on_chain_txs_count.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("len", &self.len())
            .field("sealed", &self.sealed_txs_size.load(Ordering::Acquire))
            .field("block_number", &self.block_number())
            .finish()
    }
}

/// Milliseconds since the Unix epoch.
fn utc_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}
