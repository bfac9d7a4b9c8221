//! Deterministic tests for the pool storage: submission, fetch, seal
//! transitions, removal, expiry, and gossip suppression.

use std::{collections::HashSet, sync::Arc, time::Duration};

use basalt_chain::{
    block::{Hash as BlockHash, Header, Height, ProposalId},
    transaction::{Hash, SubmitResult, TransactionStatus},
};

use super::{
    default_test_pool, short_expiry_config, system_transaction, test_pool, user_transaction,
};
use crate::{
    config::Config, error::TxPoolError, notifier::NotifyChannel, storage::PeerId,
};

fn no_avoid() -> HashSet<Hash> {
    HashSet::new()
}

fn proposal(number: u64, byte: u8) -> ProposalId {
    ProposalId::new(Height(number), BlockHash([byte; 32]))
}

fn header(number: u64, byte: u8) -> Header {
    Header {
        number: Height(number),
        hash: BlockHash([byte; 32]),
    }
}

/// The number of sealed entries, derived from the public counters.
fn sealed_size(pool: &super::TestPool) -> usize {
    pool.storage.len() - pool.storage.unsealed_txs_size()
}

// === Submission ===

#[tokio::test]
async fn submissions_are_pending_until_pool_is_full() {
    // S1: pool limit 2; two submissions ripen, the third bounces.
    let pool = test_pool(Config {
        pool_limit: 2,
        ..Config::default()
    });

    let first = user_transaction("1");
    let second = user_transaction("2");
    let third = user_transaction("3");

    let storage = pool.storage.clone();
    let first_handle = {
        let tx = first.clone();
        let storage = storage.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };
    let second_handle = {
        let tx = second.clone();
        let storage = storage.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };

    // Both submissions are resident and still pending.
    while storage.len() < 2 {
        tokio::task::yield_now().await;
    }
    assert!(!first_handle.is_finished());
    assert!(!second_handle.is_finished());

    assert_eq!(
        storage.submit_transaction(third).await,
        Err(TxPoolError::TxPoolIsFull)
    );

    // Resolve the pending futures so the test tears down cleanly.
    storage.clear();
    assert_eq!(
        first_handle.await.expect("task"),
        Err(TxPoolError::Dropped)
    );
    assert_eq!(
        second_handle.await.expect("task"),
        Err(TxPoolError::Dropped)
    );
}

#[tokio::test]
async fn duplicate_hash_is_rejected_not_merged() {
    // B3: the same transaction submitted twice yields exactly one accept and
    // one AlreadyInTxPool.
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();

    let first = {
        let storage = pool.storage.clone();
        let tx = transaction.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };
    let second = {
        let storage = pool.storage.clone();
        let tx = transaction.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };

    // Whichever task won the race, wait for the loser's rejection before
    // committing the resident entry so the winner resolves.
    while !first.is_finished() && !second.is_finished() {
        tokio::task::yield_now().await;
    }
    pool.storage.batch_remove(
        Height(1),
        vec![SubmitResult::committed(
            hash,
            transaction.nonce().clone(),
            proposal(1, 0x01),
        )],
    );

    let outcomes = [
        first.await.expect("task"),
        second.await.expect("task"),
    ];
    let accepted = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(result) if result.status == TransactionStatus::None))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|outcome| **outcome == Err(TxPoolError::AlreadyInTxPool))
        .count();
    assert_eq!((accepted, duplicates), (1, 1));
}

#[tokio::test]
async fn p2p_import_bypasses_the_pool_limit() {
    // B1: at capacity, client submissions bounce but peer imports land.
    let pool = test_pool(Config {
        pool_limit: 2,
        ..Config::default()
    });

    assert_eq!(
        pool.storage
            .batch_import_txs(vec![user_transaction("1"), user_transaction("2")]),
        2
    );
    assert_eq!(
        pool.storage.submit_transaction(user_transaction("3")).await,
        Err(TxPoolError::TxPoolIsFull)
    );
    assert_eq!(
        pool.storage.batch_import_txs(vec![user_transaction("4")]),
        1
    );
    assert_eq!(pool.storage.len(), 3);
}

#[tokio::test]
async fn import_records_live_nonces() {
    use basalt_chain::{transaction::Transaction, Address};

    let pool = default_test_pool();
    let key = ed25519_zebra::SigningKey::new(rand::thread_rng());
    let signed = |data: &[u8]| {
        Transaction::sign(
            super::TEST_CHAIN_ID,
            "1".into(),
            Address([0x42; 20]),
            100_000,
            u64::MAX,
            data.to_vec(),
            0,
            false,
            &key,
        )
    };

    let transaction = signed(b"first");
    assert_eq!(pool.storage.batch_import_txs(vec![transaction.clone()]), 1);
    assert!(pool.pool_nonces.contains(&transaction));

    // A different transaction reusing the live nonce from the same sender is
    // a replay and is rejected.
    let replay = signed(b"second");
    assert_ne!(replay.hash(), transaction.hash());
    assert_eq!(pool.storage.batch_import_txs(vec![replay]), 0);
    assert_eq!(pool.storage.len(), 1);
}

// === Fetch & seal ===

#[tokio::test]
async fn fetch_marks_entries_sealed_and_returns_metadata() {
    // S2: one resident transaction, fetch with a roomy limit.
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    pool.storage.batch_import_txs(vec![transaction.clone()]);

    let (txs, sys_txs) = pool.storage.batch_fetch_txs(10, &no_avoid(), true);

    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].hash, hash);
    assert_eq!(txs[0].to, transaction.to());
    assert!(sys_txs.is_empty());
    assert_eq!(sealed_size(&pool), 1);

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert!(entries[0].is_sealed());
    // The claiming proposal is recorded later, by batch_mark_txs.
    assert_eq!(entries[0].proposal(), None);
}

#[tokio::test]
async fn fetch_splits_system_transactions_and_caps_the_sum() {
    let pool = default_test_pool();
    pool.storage.batch_import_txs(vec![
        user_transaction("1"),
        user_transaction("2"),
        system_transaction("3"),
    ]);

    let (txs, sys_txs) = pool.storage.batch_fetch_txs(2, &no_avoid(), true);
    assert_eq!(txs.len() + sys_txs.len(), 2);

    // The rest is picked up by the next fetch.
    let (more_txs, more_sys) = pool.storage.batch_fetch_txs(2, &no_avoid(), true);
    assert_eq!(more_txs.len() + more_sys.len(), 1);

    let total_sys = sys_txs.len() + more_sys.len();
    assert_eq!(total_sys, 1);
    assert_eq!(sealed_size(&pool), 3);
}

#[tokio::test]
async fn fetch_skips_avoided_and_already_sealed_entries() {
    let pool = default_test_pool();
    let avoided = user_transaction("1");
    let avoided_hash = avoided.hash();
    let wanted = user_transaction("2");
    let wanted_hash = wanted.hash();
    pool.storage.batch_import_txs(vec![avoided, wanted]);

    let avoid: HashSet<Hash> = [avoided_hash].into_iter().collect();
    let (txs, sys_txs) = pool.storage.batch_fetch_txs(10, &avoid, true);
    assert_eq!(txs.len() + sys_txs.len(), 1);
    assert_eq!(txs[0].hash, wanted_hash);

    // Already sealed: a duplicate-avoiding fetch returns nothing.
    let (txs, sys_txs) = pool.storage.batch_fetch_txs(10, &avoid, true);
    assert!(txs.is_empty() && sys_txs.is_empty());

    // A sealer re-building a proposal may pick sealed entries back up.
    let (txs, _) = pool.storage.batch_fetch_txs(10, &no_avoid(), false);
    assert_eq!(txs.len(), 2);
}

#[tokio::test]
async fn fetch_retires_committed_transactions() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    pool.storage.batch_import_txs(vec![transaction.clone()]);

    // The transaction commits on another path; only the ledger knows.
    pool.ledger_nonces
        .batch_insert(Height(3), vec![transaction.nonce().clone()]);

    let (txs, sys_txs) = pool.storage.batch_fetch_txs(10, &no_avoid(), true);
    assert!(txs.is_empty() && sys_txs.is_empty());
    assert_eq!(pool.storage.len(), 0);
    assert!(!pool.pool_nonces.contains(&transaction));
}

// === Seal-flag transitions ===

#[tokio::test]
async fn unseal_clears_the_claiming_proposal() {
    // S3: unsealing after a fetch restores the unsealed state entirely.
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    pool.storage.batch_import_txs(vec![transaction]);
    pool.storage.batch_fetch_txs(10, &no_avoid(), true);

    pool.storage
        .batch_mark_txs(&[hash], proposal(7, 0xDE), false);

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert!(!entries[0].is_sealed());
    assert_eq!(entries[0].proposal(), None);
    assert_eq!(sealed_size(&pool), 0);
}

#[tokio::test]
async fn fetch_then_unseal_restores_the_sealed_counter() {
    // R2: a fetch followed by an unseal of the returned hashes is a no-op on
    // the sealed counter.
    let pool = default_test_pool();
    pool.storage
        .batch_import_txs(vec![user_transaction("1"), user_transaction("2")]);
    assert_eq!(sealed_size(&pool), 0);

    let (txs, sys_txs) = pool.storage.batch_fetch_txs(10, &no_avoid(), true);
    assert_eq!(sealed_size(&pool), 2);

    let returned: Vec<Hash> = txs
        .iter()
        .chain(sys_txs.iter())
        .map(|meta| meta.hash)
        .collect();
    pool.storage
        .batch_mark_txs(&returned, proposal(7, 0xDE), false);
    assert_eq!(sealed_size(&pool), 0);
}

#[tokio::test]
async fn marking_seals_under_the_given_proposal() {
    // P4: marked entries carry the proposal; unsealing them clears it.
    let pool = default_test_pool();
    let first = user_transaction("1");
    let second = user_transaction("2");
    let hashes = [first.hash(), second.hash()];
    pool.storage.batch_import_txs(vec![first, second]);

    let claim = proposal(7, 0xDE);
    pool.storage.batch_mark_txs(&hashes, claim, true);

    let (entries, _) = pool.storage.fetch_txs(&hashes);
    for entry in &entries {
        assert!(entry.is_sealed());
        assert_eq!(entry.proposal(), Some(claim));
    }
    assert_eq!(sealed_size(&pool), 2);

    pool.storage.batch_mark_txs(&hashes, claim, false);
    let (entries, _) = pool.storage.fetch_txs(&hashes);
    for entry in &entries {
        assert!(!entry.is_sealed());
        assert_eq!(entry.proposal(), None);
    }
    assert_eq!(sealed_size(&pool), 0);
}

#[tokio::test]
async fn stale_unseal_requests_are_skipped() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    pool.storage.batch_import_txs(vec![transaction]);

    let original = proposal(7, 0xDE);
    let newer = proposal(8, 0xEF);
    pool.storage.batch_mark_txs(&[hash], newer, true);

    // Reverting the older proposal must not unseal the newer claim.
    pool.storage.batch_mark_txs(&[hash], original, false);

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert!(entries[0].is_sealed());
    assert_eq!(entries[0].proposal(), Some(newer));
    assert_eq!(sealed_size(&pool), 1);
}

#[tokio::test]
async fn mark_all_applies_a_uniform_flag() {
    let pool = default_test_pool();
    pool.storage
        .batch_import_txs(vec![user_transaction("1"), user_transaction("2")]);

    pool.storage.batch_mark_all_txs(true);
    assert_eq!(sealed_size(&pool), 2);

    pool.storage.batch_mark_all_txs(false);
    assert_eq!(sealed_size(&pool), 0);
}

// === Removal ===

#[tokio::test]
async fn batch_remove_resolves_submitters_and_feeds_nonce_checkers() {
    // S4 / R1 / P3: a commit removes the entry, resolves the pending
    // submission exactly once, and updates both nonce checkers.
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    let nonce = transaction.nonce().clone();

    let submission = {
        let storage = pool.storage.clone();
        let tx = transaction.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };
    while pool.storage.len() < 1 {
        tokio::task::yield_now().await;
    }
    pool.storage.batch_fetch_txs(10, &no_avoid(), true);

    let committed_in = proposal(7, 0xBC);
    pool.storage.batch_remove(
        Height(7),
        vec![SubmitResult::committed(hash, nonce.clone(), committed_in)],
    );

    assert_eq!(pool.storage.len(), 0);
    assert!(!pool.storage.contains(&hash));

    let result = submission
        .await
        .expect("task")
        .expect("submission resolves with a result");
    assert_eq!(result.tx_hash, hash);
    assert_eq!(result.status, TransactionStatus::None);
    assert_eq!(result.sender, Some(transaction.sender()));
    assert_eq!(result.to, Some(transaction.to()));
    assert_eq!(result.proposal, Some(committed_in));

    // Ledger checker learned the nonce; the live set forgot it.
    assert!(pool.ledger_nonces.contains(&nonce));
    assert_eq!(pool.ledger_nonces.latest_batch(), Height(7));
    assert!(pool.pool_nonces.is_empty());
    assert_eq!(pool.storage.block_number(), Height(7));
}

#[tokio::test]
async fn orphan_commits_still_feed_the_ledger_checker() {
    let pool = default_test_pool();
    let absent_hash = Hash([0xAB; 32]);

    pool.storage.batch_remove(
        Height(9),
        vec![SubmitResult::committed(
            absent_hash,
            "orphan".into(),
            proposal(9, 0x99),
        )],
    );

    assert!(pool.ledger_nonces.contains(&"orphan".into()));
    assert_eq!(pool.storage.block_number(), Height(9));
}

#[tokio::test]
async fn started_pool_delivers_results_through_the_notifier_workers() {
    // With the pool started, commit results reach submitters via the
    // fan-out workers instead of the consensus thread.
    let pool = default_test_pool();
    pool.storage.start();

    let transaction = user_transaction("1");
    let hash = transaction.hash();
    let submission = {
        let storage = pool.storage.clone();
        let tx = transaction.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };
    while pool.storage.len() < 1 {
        tokio::task::yield_now().await;
    }

    pool.storage.batch_remove(
        Height(2),
        vec![SubmitResult::committed(
            hash,
            transaction.nonce().clone(),
            proposal(2, 0x02),
        )],
    );

    let result = submission
        .await
        .expect("task")
        .expect("worker-delivered result");
    assert_eq!(result.tx_hash, hash);
    assert_eq!(result.status, TransactionStatus::None);
    assert_eq!(result.sender, Some(transaction.sender()));

    pool.storage.stop().await;
}

#[tokio::test]
async fn clear_drops_pending_submissions() {
    let pool = default_test_pool();
    let submission = {
        let storage = pool.storage.clone();
        tokio::spawn(async move { storage.submit_transaction(user_transaction("1")).await })
    };
    while pool.storage.len() < 1 {
        tokio::task::yield_now().await;
    }

    pool.storage.clear();
    assert_eq!(pool.storage.len(), 0);
    assert_eq!(
        submission.await.expect("task"),
        Err(TxPoolError::Dropped)
    );
}

// === Expiry ===

#[tokio::test]
async fn expired_submissions_time_out() {
    // S5: an unfetched submission expires and resolves with
    // TransactionPoolTimeout on the next sweep.
    let pool = test_pool(short_expiry_config(Duration::from_millis(50)));
    let transaction = user_transaction("1");
    let hash = transaction.hash();

    let submission = {
        let storage = pool.storage.clone();
        let tx = transaction.clone();
        tokio::spawn(async move { storage.submit_transaction(tx).await })
    };
    while pool.storage.len() < 1 {
        tokio::task::yield_now().await;
    }

    tokio::time::sleep(Duration::from_millis(120)).await;
    pool.storage.clean_up_expired_transactions();

    assert_eq!(pool.storage.len(), 0);
    let result = submission
        .await
        .expect("task")
        .expect("timeout is reported as a result");
    assert_eq!(result.tx_hash, hash);
    assert_eq!(result.status, TransactionStatus::TransactionPoolTimeout);
    assert!(!pool.pool_nonces.contains(&transaction));
}

#[tokio::test]
async fn sweep_spares_entries_sealed_for_pending_proposals() {
    // B2: expiry spares an entry sealed for a proposal at or above the
    // committed batch number, until the chain moves past it.
    let pool = test_pool(short_expiry_config(Duration::from_millis(50)));
    let sealed = user_transaction("1");
    let sealed_hash = sealed.hash();
    let unsealed = user_transaction("2");
    let unsealed_hash = unsealed.hash();
    pool.storage.batch_import_txs(vec![sealed, unsealed]);
    pool.storage
        .batch_mark_txs(&[sealed_hash], proposal(5, 0x05), true);

    tokio::time::sleep(Duration::from_millis(120)).await;
    pool.storage.clean_up_expired_transactions();

    assert!(pool.storage.contains(&sealed_hash));
    assert!(!pool.storage.contains(&unsealed_hash));

    // Once the chain moves past the claiming proposal, the shield is gone.
    pool.storage.batch_remove(Height(6), Vec::new());
    pool.storage.clean_up_expired_transactions();
    assert!(!pool.storage.contains(&sealed_hash));
}

#[tokio::test]
async fn cleanup_switch_bypasses_the_sweep() {
    let pool = test_pool(short_expiry_config(Duration::from_millis(10)));
    pool.storage.set_cleanup_switch(Arc::new(|| false));
    pool.storage.batch_import_txs(vec![user_transaction("1")]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.storage.clean_up_expired_transactions();

    // The switch told the sweep to stand down.
    assert_eq!(pool.storage.len(), 1);
}

// === Gossip suppression ===

#[tokio::test]
async fn filter_marks_known_peers_and_dedups_misses() {
    // S6 / P5: resident hashes are marked as known to the peer; unknown
    // hashes are requested once.
    let pool = default_test_pool();
    let resident = user_transaction("1");
    let resident_hash = resident.hash();
    pool.storage.batch_import_txs(vec![resident]);

    let peer = PeerId([0x01; 32]);
    let unknown_hash = Hash([0xBB; 32]);

    let unknown = pool
        .storage
        .filter_unknown_txs(&[resident_hash, unknown_hash], peer);
    assert_eq!(unknown, vec![unknown_hash]);

    let (entries, _) = pool.storage.fetch_txs(&[resident_hash]);
    assert!(entries[0].is_known_to(&peer));

    // The miss is remembered: an identical advertisement requests nothing.
    let unknown = pool
        .storage
        .filter_unknown_txs(&[resident_hash, unknown_hash], peer);
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn batch_insert_admits_fetched_misses() {
    let pool = default_test_pool();
    let peer = PeerId([0x01; 32]);
    let advertised = user_transaction("1");
    let advertised_hash = advertised.hash();

    let unknown = pool.storage.filter_unknown_txs(&[advertised_hash], peer);
    assert_eq!(unknown, vec![advertised_hash]);

    // The peer answered the fetch; the transaction is admitted and the miss
    // record is dropped, so a re-advertisement is suppressed.
    pool.storage.batch_insert(vec![advertised]);
    assert!(pool.storage.contains(&advertised_hash));

    let unknown = pool.storage.filter_unknown_txs(&[advertised_hash], peer);
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn missed_set_is_cleared_at_the_pool_limit() {
    let pool = test_pool(Config {
        pool_limit: 2,
        ..Config::default()
    });
    let peer = PeerId([0x01; 32]);

    let first = Hash([0x01; 32]);
    let second = Hash([0x02; 32]);
    pool.storage.filter_unknown_txs(&[first, second], peer);

    // The set hit the bound and was cleared: known-missing hashes may be
    // re-requested.
    let unknown = pool.storage.filter_unknown_txs(&[first], peer);
    assert_eq!(unknown, vec![first]);
}

// === Enforced insertion ===

#[tokio::test]
async fn enforce_admits_absent_transactions_sealed() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();

    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction]));

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert!(entries[0].is_sealed());
    assert_eq!(entries[0].proposal(), Some(proposal(4, 0x44)));
    assert_eq!(sealed_size(&pool), 1);
}

#[tokio::test]
async fn enforce_claims_resident_unsealed_transactions() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    pool.storage.batch_import_txs(vec![transaction.clone()]);

    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction]));

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert!(entries[0].is_sealed());
    assert_eq!(entries[0].proposal(), Some(proposal(4, 0x44)));
    assert_eq!(pool.storage.len(), 1);
}

#[tokio::test]
async fn enforce_is_idempotent_for_the_same_proposal() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");

    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction.clone()]));
    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction]));
    assert_eq!(sealed_size(&pool), 1);
}

#[tokio::test]
async fn enforce_rejects_conflicting_proposals() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");

    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction.clone()]));
    // Another proposal claims the same transaction: the batch conflicts.
    assert!(!pool
        .storage
        .batch_verify_and_submit(&header(5, 0x55), &[transaction]));
}

#[tokio::test]
async fn enforce_rejects_committed_transactions() {
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    pool.ledger_nonces
        .batch_insert(Height(3), vec![transaction.nonce().clone()]);

    assert!(!pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction]));
    assert_eq!(pool.storage.len(), 0);
}

#[tokio::test]
async fn enforce_claims_fetched_but_unmarked_entries() {
    // A locally fetched entry is sealed with no proposal recorded yet;
    // an enforced proposal may still claim it.
    let pool = default_test_pool();
    let transaction = user_transaction("1");
    let hash = transaction.hash();
    pool.storage.batch_import_txs(vec![transaction.clone()]);
    pool.storage.batch_fetch_txs(10, &no_avoid(), true);

    assert!(pool
        .storage
        .batch_verify_and_submit(&header(4, 0x44), &[transaction]));

    let (entries, _) = pool.storage.fetch_txs(&[hash]);
    assert_eq!(entries[0].proposal(), Some(proposal(4, 0x44)));
    assert_eq!(sealed_size(&pool), 1);
}

// === Proposal availability & queries ===

#[tokio::test]
async fn missing_proposal_txs_reports_only_absent_hashes() {
    let pool = default_test_pool();
    let resident = user_transaction("1");
    let resident_hash = resident.hash();
    pool.storage.batch_import_txs(vec![resident]);

    let absent = Hash([0xCC; 32]);
    let missing = pool
        .storage
        .missing_proposal_txs(&header(4, 0x44), &[resident_hash, absent]);
    assert_eq!(missing, vec![absent]);

    assert!(pool.storage.proposal_txs_known(&[resident_hash]));
    assert!(!pool.storage.proposal_txs_known(&[resident_hash, absent]));
}

#[tokio::test]
async fn fetch_txs_reports_misses() {
    let pool = default_test_pool();
    let resident = user_transaction("1");
    let resident_hash = resident.hash();
    pool.storage.batch_import_txs(vec![resident]);

    let absent = Hash([0xDD; 32]);
    let (fetched, missed) = pool.storage.fetch_txs(&[resident_hash, absent]);
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].hash(), resident_hash);
    assert_eq!(missed, vec![absent]);
}

#[tokio::test]
async fn fetch_new_txs_claims_each_entry_once() {
    let pool = default_test_pool();
    pool.storage
        .batch_import_txs(vec![user_transaction("1"), user_transaction("2")]);

    let first = pool.storage.fetch_new_txs(1);
    assert_eq!(first.len(), 1);
    assert!(first[0].is_synced());

    let second = pool.storage.fetch_new_txs(10);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0].hash(), second[0].hash());

    assert!(pool.storage.fetch_new_txs(10).is_empty());
}

#[tokio::test]
async fn tx_hashes_is_bounded() {
    let pool = default_test_pool();
    pool.storage.batch_import_txs(vec![
        user_transaction("1"),
        user_transaction("2"),
        user_transaction("3"),
    ]);

    assert_eq!(pool.storage.tx_hashes(2).len(), 2);
    assert_eq!(pool.storage.tx_hashes(10).len(), 3);
}

// === Unsealed-count notifications ===

#[tokio::test]
async fn mutations_report_the_unsealed_count() {
    let pool = default_test_pool();
    let (notifier, mut counts) = NotifyChannel::channel(16);
    pool.storage.set_unsealed_notifier(notifier);

    pool.storage.batch_import_txs(vec![user_transaction("1")]);
    assert_eq!(counts.recv().await, Some(1));

    pool.storage.batch_fetch_txs(10, &no_avoid(), true);
    assert_eq!(counts.recv().await, Some(0));

    pool.storage.batch_mark_all_txs(false);
    assert_eq!(counts.recv().await, Some(1));
}
