//! Transactions: signed, content-addressed blobs awaiting inclusion in a batch.

use std::fmt;

use ed25519_zebra::{Signature, SigningKey, VerificationKey, VerificationKeyBytes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::block::ProposalId;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// A 32-byte content-addressed transaction identifier.
///
/// The hash covers every field of the transaction, including the signature,
/// so two transactions with the same payload but different signatures have
/// different identifiers.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Hash {
    /// Returns a shortened hex rendering for log output.
    pub fn abridged(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// A per-sender replay-protection value.
///
/// Nonces are opaque to the pool: their structure is only interpreted by the
/// nonce checkers, which treat them as unique strings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Nonce(pub String);

impl Nonce {
    /// Returns true if this nonce carries no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Nonce {
    fn from(nonce: &str) -> Self {
        Nonce(nonce.to_owned())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 20-byte account address, derived from a verification key.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Derives the address of a verification key: the first 20 bytes of its
    /// SHA-256 digest.
    pub fn from_verification_key(key_bytes: &[u8; 32]) -> Self {
        let digest = Sha256::digest(key_bytes);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[..20]);
        Address(address)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Address").field(&hex::encode(self.0)).finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Wire-visible transaction status codes.
///
/// Clients depend on the numeric values: they are returned over RPC for
/// rejected submissions and carried in submit results. New kinds must be
/// appended, never renumbered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
#[repr(u32)]
pub enum TransactionStatus {
    /// No error: the transaction was accepted, or is committed on chain.
    None = 0,
    /// The transaction could not be decoded or failed an internal check.
    Malform = 1,
    /// A transaction with the same hash is already resident in the pool.
    AlreadyInTxPool = 2,
    /// The pool is at capacity and the submission was client-sourced.
    TxPoolIsFull = 3,
    /// The nonce duplicates a live pool entry or a committed transaction.
    NonceCheckFail = 4,
    /// The transaction's block limit window has expired.
    BlockLimitCheckFail = 5,
    /// The transaction expired in the pool before being sealed.
    TransactionPoolTimeout = 6,
    /// The transaction was signed for a different chain.
    InvalidChainId = 7,
    /// The signature does not verify against the sender's key.
    InvalidSignature = 8,
    /// The declared gas limit exceeds the chain's per-transaction bound.
    GasLimitExceeded = 9,
}

impl TransactionStatus {
    /// The numeric wire code of this status.
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            TransactionStatus::None => "None",
            TransactionStatus::Malform => "Malform",
            TransactionStatus::AlreadyInTxPool => "AlreadyInTxPool",
            TransactionStatus::TxPoolIsFull => "TxPoolIsFull",
            TransactionStatus::NonceCheckFail => "NonceCheckFail",
            TransactionStatus::BlockLimitCheckFail => "BlockLimitCheckFail",
            TransactionStatus::TransactionPoolTimeout => "TransactionPoolTimeout",
            TransactionStatus::InvalidChainId => "InvalidChainId",
            TransactionStatus::InvalidSignature => "InvalidSignature",
            TransactionStatus::GasLimitExceeded => "GasLimitExceeded",
        };
        f.write_str(msg)
    }
}

/// Attribute bits affecting how a sealer schedules a transaction.
pub type Attribute = u32;

/// A signed transaction, as submitted by clients or gossiped between peers.
///
/// The payload fields are immutable once signed; pool-side state such as the
/// seal flag lives in the pool's own entry wrapper, not here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The chain this transaction was signed for.
    chain_id: u32,
    /// Replay protection value, unique per sender.
    nonce: Nonce,
    /// The called or paid account.
    to: Address,
    /// The sender's declared gas budget.
    gas_limit: u64,
    /// The highest batch number this transaction may be committed in.
    block_limit: u64,
    /// Call input data.
    data: Vec<u8>,
    /// Scheduling attribute bits.
    attribute: Attribute,
    /// True for system transactions, which seal into a separate bucket.
    system: bool,
    /// The sender's ed25519 verification key.
    verification_key: [u8; 32],
    /// Signature over the unsigned encoding.
    #[serde(with = "signature_bytes")]
    signature: [u8; 64],
}

/// Serde support for the 64-byte signature field, which is wider than the
/// arrays serde derives handle.
mod signature_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        signature: &[u8; 64],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(signature)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected a 64 byte signature"))
    }
}

impl Transaction {
    /// Builds and signs a transaction with the given signing key.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        chain_id: u32,
        nonce: Nonce,
        to: Address,
        gas_limit: u64,
        block_limit: u64,
        data: Vec<u8>,
        attribute: Attribute,
        system: bool,
        signing_key: &SigningKey,
    ) -> Self {
        let verification_key: [u8; 32] =
            VerificationKeyBytes::from(VerificationKey::from(signing_key)).into();
        let mut transaction = Transaction {
            chain_id,
            nonce,
            to,
            gas_limit,
            block_limit,
            data,
            attribute,
            system,
            verification_key,
            signature: [0u8; 64],
        };
        let signature = signing_key.sign(&transaction.signing_digest());
        transaction.signature = signature.into();
        transaction
    }

    /// The content-addressed identifier of this transaction.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new_with_prefix(self.signing_digest());
        hasher.update(self.verification_key);
        hasher.update(self.signature);
        Hash(hasher.finalize().into())
    }

    /// The digest the sender signed: a SHA-256 over the canonical encoding of
    /// every field except the key and signature.
    fn signing_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.chain_id.to_le_bytes());
        hasher.update((self.nonce.0.len() as u64).to_le_bytes());
        hasher.update(self.nonce.0.as_bytes());
        hasher.update(self.to.0);
        hasher.update(self.gas_limit.to_le_bytes());
        hasher.update(self.block_limit.to_le_bytes());
        hasher.update((self.data.len() as u64).to_le_bytes());
        hasher.update(&self.data);
        hasher.update(self.attribute.to_le_bytes());
        hasher.update([u8::from(self.system)]);
        hasher.finalize().into()
    }

    /// Checks the ed25519 signature against the embedded verification key.
    pub fn verify_signature(&self) -> Result<(), TransactionStatus> {
        let key = VerificationKey::try_from(self.verification_key)
            .map_err(|_| TransactionStatus::InvalidSignature)?;
        key.verify(&Signature::from(self.signature), &self.signing_digest())
            .map_err(|_| TransactionStatus::InvalidSignature)
    }

    /// The chain id this transaction was signed for.
    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    /// The sender's replay-protection nonce.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// The sender address, derived from the verification key.
    pub fn sender(&self) -> Address {
        Address::from_verification_key(&self.verification_key)
    }

    /// The called or paid account.
    pub fn to(&self) -> Address {
        self.to
    }

    /// The sender's declared gas budget.
    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// The highest batch number this transaction may be committed in.
    pub fn block_limit(&self) -> u64 {
        self.block_limit
    }

    /// Scheduling attribute bits.
    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// True for system transactions.
    pub fn is_system(&self) -> bool {
        self.system
    }
}

/// The subset of a transaction a sealer needs to assemble a proposal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetaData {
    /// The transaction identifier.
    pub hash: Hash,
    /// The called or paid account.
    pub to: Address,
    /// Scheduling attribute bits.
    pub attribute: Attribute,
}

/// The terminal result of a submitted transaction.
///
/// Consensus constructs these when a batch commits; the pool fills in the
/// sender and recipient from its own entry before notifying the submitter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    /// The transaction identifier.
    pub tx_hash: Hash,
    /// The terminal status code.
    pub status: TransactionStatus,
    /// The transaction's nonce, carried so nonce checkers learn of commits
    /// even when the pool never held the transaction.
    pub nonce: Nonce,
    /// The sender address, filled by the pool when known.
    pub sender: Option<Address>,
    /// The recipient address, filled by the pool when known.
    pub to: Option<Address>,
    /// The batch that committed the transaction, when applicable.
    pub proposal: Option<ProposalId>,
}

impl SubmitResult {
    /// Creates a result for a transaction committed in a batch.
    pub fn committed(tx_hash: Hash, nonce: Nonce, proposal: ProposalId) -> Self {
        SubmitResult {
            tx_hash,
            status: TransactionStatus::None,
            nonce,
            sender: None,
            to: None,
            proposal: Some(proposal),
        }
    }

    /// Creates a result carrying only a status, for pool-side terminations.
    pub fn with_status(tx_hash: Hash, nonce: Nonce, status: TransactionStatus) -> Self {
        SubmitResult {
            tx_hash,
            status,
            nonce,
            sender: None,
            to: None,
            proposal: None,
        }
    }
}
