//! Transaction error taxonomy.
//!
//! Every rejection names its kind and, where one exists, the offending
//! index or identifier. Nothing is retried here. Callers get the typed
//! result and decide.

use std::fmt;

use crate::config::ShardId;
use crate::crypto::hash::Hash;
use crate::privacy::ProofFailure;
use crate::storage::StoreError;

/// Where a double spend was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleSpendLayer {
    /// A serial number already stored in the ledger.
    SerialNumber,
    /// Two transactions of the same block spend the same thing.
    Block,
    /// Conflicts with a transaction still pending in the pool.
    Pool,
    /// Conflicts with settled token history.
    Chain,
}

impl fmt::Display for DoubleSpendLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SerialNumber => "serial-number",
            Self::Block => "block",
            Self::Pool => "pool",
            Self::Chain => "chain",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("malformed signature bytes: {reason}")]
    MalformedSignatureBytes { reason: String },

    #[error("ring signature of tx {tx_hash} does not verify: {reason}")]
    SignatureVerificationFailed { tx_hash: Hash, reason: String },

    #[error("ring row {row} column {column} disagrees with the ledger: {reason}")]
    RingInconsistentWithLedger {
        row: usize,
        column: usize,
        reason: String,
    },

    #[error("proof of tx {tx_hash} failed: {kind}")]
    ProofVerificationFailed { tx_hash: Hash, kind: ProofFailure },

    #[error("double spend ({layer}): {detail}")]
    DoubleSpendDetected { layer: DoubleSpendLayer, detail: String },

    #[error("output {output} reuses an SND already stored on shard {shard_id}")]
    SndAlreadyExists { output: usize, shard_id: ShardId },

    #[error("token {property_id}: inputs carry {inputs}, outputs carry {outputs}")]
    BalanceMismatch {
        property_id: Hash,
        inputs: u64,
        outputs: u64,
    },

    #[error("insufficient input: have {available}, need {required}")]
    InsufficientInput { available: u64, required: u64 },

    #[error("token {0} already exists")]
    TokenAlreadyExists(Hash),

    #[error("token {0} not found")]
    TokenNotFound(Hash),

    #[error("no commitments stored for token {token_id} on shard {shard_id}")]
    NoCommitmentsAvailable { token_id: Hash, shard_id: ShardId },

    #[error("could not find {needed} distinct decoys after {attempts} attempts")]
    DecoySelectionExhausted { needed: usize, attempts: usize },

    #[error("input coin {input} is not in the ledger")]
    UnknownInputCoin { input: usize },

    #[error("vin {vin} references unknown output {tx_id}:{vout_index}")]
    UnknownUtxo { vin: usize, tx_id: Hash, vout_index: u32 },

    #[error("vin {vin} signature does not authorize the referenced output")]
    InvalidVinSignature { vin: usize },

    #[error("signing failed: {reason}")]
    SigningError { reason: String },

    #[error("fee {fee} below required {required} for {size} bytes")]
    FeeTooLow { fee: u64, required: u64, size: usize },

    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("transaction {0} already pending")]
    DuplicateTransaction(Hash),

    #[error("pool is full ({0} transactions)")]
    PoolFull(usize),

    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),
}

impl TxError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSignatureBytes {
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for TxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateSerialNumber { .. } => Self::DoubleSpendDetected {
                layer: DoubleSpendLayer::SerialNumber,
                detail: err.to_string(),
            },
            StoreError::TokenOutputUnavailable { .. } | StoreError::TokenOutputExists { .. } => {
                Self::DoubleSpendDetected {
                    layer: DoubleSpendLayer::Chain,
                    detail: err.to_string(),
                }
            }
            other => Self::StoreUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_serial_maps_to_double_spend() {
        let err = StoreError::DuplicateSerialNumber {
            token_id: Hash::zero(),
            shard_id: 1,
            serial_number: "ab".into(),
        };
        match TxError::from(err) {
            TxError::DoubleSpendDetected {
                layer: DoubleSpendLayer::SerialNumber,
                ..
            } => {}
            other => panic!("expected DoubleSpendDetected, got {:?}", other),
        }
    }

    #[test]
    fn io_failures_map_to_store_unavailable() {
        let err = StoreError::Corrupt("bad length".into());
        assert!(matches!(TxError::from(err), TxError::StoreUnavailable(_)));
    }
}
