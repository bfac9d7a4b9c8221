//! Blocks, batch identifiers, and proposal identities.
//!
//! A *batch* is a candidate or committed block's set of transactions. Batches
//! are identified by a [`Height`] once committed, and by a `(Height,
//! Hash)` pair — a [`ProposalId`] — while still a candidate proposal.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The number of a committed or proposed batch.
///
/// Batch numbers increase monotonically along the canonical chain.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Height(pub u64);

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The hash identifying a proposed or committed batch.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("block::Hash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The identity of the proposal that claimed a transaction for sealing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct ProposalId {
    /// The proposed batch number.
    pub number: Height,
    /// The proposed batch hash.
    pub hash: Hash,
}

impl ProposalId {
    /// Creates a proposal identity from a batch number and hash.
    pub fn new(number: Height, hash: Hash) -> Self {
        Self { number, hash }
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.number, self.hash)
    }
}

/// The header of a proposed batch, as the transaction pool sees it.
///
/// Consensus hands the pool a header when enforcing a peer proposal's
/// transactions into the pool, or when checking which of a proposal's
/// transactions the pool is missing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// The batch number of the proposal.
    pub number: Height,
    /// The batch hash of the proposal.
    pub hash: Hash,
}

impl Header {
    /// The proposal identity of this header.
    pub fn proposal_id(&self) -> ProposalId {
        ProposalId::new(self.number, self.hash)
    }
}
