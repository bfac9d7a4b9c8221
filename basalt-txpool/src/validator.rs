//! Static transaction checks and the committed-on-chain probe.

use std::sync::Arc;

use tracing::trace;

use basalt_chain::transaction::{Transaction, TransactionStatus};

use crate::nonce::{LedgerNonceChecker, PoolNonceChecker};

/// The checks the pool runs against every candidate transaction.
///
/// Implementations must not call back into the pool: the pool queries
/// [`Validator::submitted_to_chain`] while holding its own locks on the
/// fetch and enforced-insert paths.
pub trait Validator: Send + Sync {
    /// Verifies the static fields of a submitted transaction: signature,
    /// chain id, gas bounds, and live-nonce uniqueness.
    ///
    /// Returns the wire-visible rejection code on failure.
    fn verify(&self, transaction: &Transaction) -> Result<(), TransactionStatus>;

    /// Checks whether the transaction already landed on chain, or can no
    /// longer land because its block limit window expired.
    ///
    /// Returns `NonceCheckFail` for committed transactions and
    /// `BlockLimitCheckFail` for expired windows.
    fn submitted_to_chain(&self, transaction: &Transaction) -> Result<(), TransactionStatus>;

    /// The checker recording committed nonces, fed by the pool on removal.
    fn ledger_nonce_checker(&self) -> &Arc<LedgerNonceChecker>;
}

/// The production validator: stateless checks over the chain parameters plus
/// the two nonce checkers.
pub struct TxValidator {
    chain_id: u32,
    max_gas_limit: u64,
    ledger_nonce_checker: Arc<LedgerNonceChecker>,
    pool_nonce_checker: Arc<PoolNonceChecker>,
}

impl TxValidator {
    /// Creates a validator for the given chain parameters.
    pub fn new(
        chain_id: u32,
        max_gas_limit: u64,
        ledger_nonce_checker: Arc<LedgerNonceChecker>,
        pool_nonce_checker: Arc<PoolNonceChecker>,
    ) -> Self {
        Self {
            chain_id,
            max_gas_limit,
            ledger_nonce_checker,
            pool_nonce_checker,
        }
    }
}

impl Validator for TxValidator {
    fn verify(&self, transaction: &Transaction) -> Result<(), TransactionStatus> {
        if transaction.chain_id() != self.chain_id {
            return Err(TransactionStatus::InvalidChainId);
        }
        if transaction.gas_limit() > self.max_gas_limit {
            return Err(TransactionStatus::GasLimitExceeded);
        }
        transaction.verify_signature()?;

        // A live entry from the same sender already holds this nonce.
        if self.pool_nonce_checker.contains(transaction) {
            trace!(tx = %transaction.hash().abridged(), "duplicate live nonce");
            return Err(TransactionStatus::NonceCheckFail);
        }
        self.submitted_to_chain(transaction)
    }

    fn submitted_to_chain(&self, transaction: &Transaction) -> Result<(), TransactionStatus> {
        if self.ledger_nonce_checker.contains(transaction.nonce()) {
            return Err(TransactionStatus::NonceCheckFail);
        }
        if transaction.block_limit() < self.ledger_nonce_checker.latest_batch().0 {
            return Err(TransactionStatus::BlockLimitCheckFail);
        }
        Ok(())
    }

    fn ledger_nonce_checker(&self) -> &Arc<LedgerNonceChecker> {
        &self.ledger_nonce_checker
    }
}
