//! Errors that can occur when submitting transactions to the pool.

use thiserror::Error;

use basalt_chain::transaction::TransactionStatus;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// A rejected or abandoned transaction submission.
///
/// Every variant maps onto a wire-visible [`TransactionStatus`] code, so RPC
/// layers can surface the exact status clients depend on.
#[derive(Error, Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub enum TxPoolError {
    #[error("transaction already exists in the pool")]
    AlreadyInTxPool,

    #[error("the pool is full")]
    TxPoolIsFull,

    #[error("nonce duplicates a live or committed transaction")]
    NonceCheckFail,

    #[error("transaction block limit window has expired")]
    BlockLimitCheckFail,

    #[error("transaction expired in the pool before being sealed")]
    TransactionPoolTimeout,

    #[error("transaction was signed for a different chain")]
    InvalidChainId,

    #[error("transaction signature does not verify")]
    InvalidSignature,

    #[error("transaction gas limit exceeds the chain bound")]
    GasLimitExceeded,

    #[error("transaction is malformed")]
    Malform,

    /// The pool dropped the submission without producing a result, for
    /// example because the pool was cleared while it was pending.
    #[error("transaction was dropped from the pool without a result")]
    Dropped,
}

impl TxPoolError {
    /// The wire-visible status code of this rejection.
    pub fn status(&self) -> TransactionStatus {
        match self {
            TxPoolError::AlreadyInTxPool => TransactionStatus::AlreadyInTxPool,
            TxPoolError::TxPoolIsFull => TransactionStatus::TxPoolIsFull,
            TxPoolError::NonceCheckFail => TransactionStatus::NonceCheckFail,
            TxPoolError::BlockLimitCheckFail => TransactionStatus::BlockLimitCheckFail,
            TxPoolError::TransactionPoolTimeout => TransactionStatus::TransactionPoolTimeout,
            TxPoolError::InvalidChainId => TransactionStatus::InvalidChainId,
            TxPoolError::InvalidSignature => TransactionStatus::InvalidSignature,
            TxPoolError::GasLimitExceeded => TransactionStatus::GasLimitExceeded,
            TxPoolError::Malform | TxPoolError::Dropped => TransactionStatus::Malform,
        }
    }
}

impl From<TransactionStatus> for TxPoolError {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::AlreadyInTxPool => TxPoolError::AlreadyInTxPool,
            TransactionStatus::TxPoolIsFull => TxPoolError::TxPoolIsFull,
            TransactionStatus::NonceCheckFail => TxPoolError::NonceCheckFail,
            TransactionStatus::BlockLimitCheckFail => TxPoolError::BlockLimitCheckFail,
            TransactionStatus::TransactionPoolTimeout => TxPoolError::TransactionPoolTimeout,
            TransactionStatus::InvalidChainId => TxPoolError::InvalidChainId,
            TransactionStatus::InvalidSignature => TxPoolError::InvalidSignature,
            TransactionStatus::GasLimitExceeded => TxPoolError::GasLimitExceeded,
            // `None` is not an error; map it with the catch-all so the
            // conversion stays total for callers converting raw codes.
            TransactionStatus::None | TransactionStatus::Malform => TxPoolError::Malform,
        }
    }
}
