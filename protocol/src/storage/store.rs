//! # Ledger Store Contract
//!
//! The read side of the ledger as the transaction engine sees it. Ring
//! building and verification only ever talk to these traits, never to sled
//! directly, so a snapshot, a live database, or a test double can stand in.
//!
//! Every commitment lookup is scoped by `(token ID, shard)`. Nothing here
//! ever mixes state across shards.

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;

use crate::config::ShardId;
use crate::crypto::hash::Hash;
use crate::privacy::Coin;
use crate::transaction::{CustomTokenTx, Transaction};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serial number {serial_number} already stored for token {token_id} on shard {shard_id}")]
    DuplicateSerialNumber {
        token_id: Hash,
        shard_id: ShardId,
        serial_number: String,
    },

    #[error("token output {utxo}:{vout_index} of {property_id} is already spent or unknown")]
    TokenOutputUnavailable {
        property_id: Hash,
        utxo: Hash,
        vout_index: u32,
    },

    #[error("token output {utxo}:{vout_index} of {property_id} already exists")]
    TokenOutputExists {
        property_id: Hash,
        utxo: Hash,
        vout_index: u32,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Commitment, serial-number and SND lookups.
pub trait CommitmentStore {
    fn has_commitment_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<bool>;

    fn commitment_count(&self, token_id: &Hash, shard_id: ShardId) -> StoreResult<u64>;

    /// The coin record (commitment, public key, SND) at `index`.
    fn commitment_by_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<Option<Coin>>;

    /// Reverse lookup: where a commitment sits in the index.
    fn commitment_index(
        &self,
        token_id: &Hash,
        commitment: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<Option<u64>>;

    fn has_serial_number(
        &self,
        token_id: &Hash,
        serial_number: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<bool>;

    fn has_snd(&self, token_id: &Hash, snd: &Scalar, shard_id: ShardId) -> StoreResult<bool>;

    fn token_exists(&self, token_id: &Hash) -> StoreResult<bool>;
}

/// Historical transaction lookups used by the custom-token checks.
pub trait ChainRetriever {
    fn transaction_by_hash(&self, hash: &Hash) -> StoreResult<Option<Transaction>>;

    /// Every settled custom-token transaction of `property_id`, in chain
    /// order.
    fn custom_token_txs(&self, property_id: &Hash) -> StoreResult<Vec<CustomTokenTx>>;
}

/// Everything transaction validation reads.
pub trait LedgerView: CommitmentStore + ChainRetriever {}

impl<T: CommitmentStore + ChainRetriever + ?Sized> LedgerView for T {}
