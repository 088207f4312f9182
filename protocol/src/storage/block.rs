//! # Shard Blocks
//!
//! Every shard runs its own chain. A block names its shard, links to its
//! parent on that shard, and carries an ordered transaction list.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  BlockHeader                                │
//! │  ├── shard_id: u8                           │
//! │  ├── height: u64                            │
//! │  ├── hash: Hash           (BLAKE3 of header)│
//! │  ├── parent_hash: Hash                      │
//! │  ├── timestamp: u64                         │
//! │  ├── producer: String                       │
//! │  └── tx_root: Hash        (Merkle root)     │
//! ├─────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The `tx_root` is a Merkle tree over the transaction hashes. The hash of
//! a transaction already commits to its signature, so the root pins the
//! exact bytes that were verified.

use serde::{Deserialize, Serialize};

use crate::config::ShardId;
use crate::crypto::hash::{blake3_hash, merkle_root, Hash};
use crate::transaction::Transaction;

/// Producer name recorded in every genesis block.
pub const GENESIS_PRODUCER: &str = "genesis";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub shard_id: ShardId,
    /// Height on this shard's chain, genesis = 0.
    pub height: u64,
    /// BLAKE3 hash of the other header fields.
    pub hash: Hash,
    /// Zero for genesis.
    pub parent_hash: Hash,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub producer: String,
    pub tx_root: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Height-0 block of `shard_id`. Its transactions may mint.
    pub fn genesis(shard_id: ShardId, transactions: Vec<Transaction>) -> Self {
        Self::build(shard_id, 0, Hash::zero(), 0, GENESIS_PRODUCER.to_string(), transactions)
    }

    /// The block after `parent` on the same shard.
    pub fn new(parent: &Block, transactions: Vec<Transaction>, producer: String) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::build(
            parent.header.shard_id,
            parent.header.height + 1,
            parent.header.hash,
            timestamp,
            producer,
            transactions,
        )
    }

    fn build(
        shard_id: ShardId,
        height: u64,
        parent_hash: Hash,
        timestamp: u64,
        producer: String,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_root = compute_tx_root(&transactions);
        let hash = compute_header_hash(shard_id, height, &parent_hash, timestamp, &producer, &tx_root);
        Self {
            header: BlockHeader {
                shard_id,
                height,
                hash,
                parent_hash,
                timestamp,
                producer,
                tx_root,
            },
            transactions,
        }
    }

    pub fn compute_hash(&self) -> Hash {
        let h = &self.header;
        compute_header_hash(h.shard_id, h.height, &h.parent_hash, h.timestamp, &h.producer, &h.tx_root)
    }

    /// Structural integrity: stored hash, tx root, and the genesis parent.
    /// Transactions themselves are checked by the chain.
    pub fn verify(&self) -> Result<(), String> {
        let expected_hash = self.compute_hash();
        if self.header.hash != expected_hash {
            return Err(format!(
                "block {}/{} hash mismatch: stored={}, computed={}",
                self.header.shard_id, self.header.height, self.header.hash, expected_hash,
            ));
        }

        let expected_tx_root = compute_tx_root(&self.transactions);
        if self.header.tx_root != expected_tx_root {
            return Err(format!(
                "block {}/{} tx_root mismatch: stored={}, computed={}",
                self.header.shard_id, self.header.height, self.header.tx_root, expected_tx_root,
            ));
        }

        if self.transactions.iter().any(|tx| tx.shard_id() != self.header.shard_id) {
            return Err(format!(
                "block {}/{} carries a transaction of another shard",
                self.header.shard_id, self.header.height
            ));
        }

        if self.header.height == 0 && self.header.parent_hash != Hash::zero() {
            return Err("genesis block must have zeroed parent_hash".to_string());
        }

        Ok(())
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn shard_id(&self) -> ShardId {
        self.header.shard_id
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

fn compute_header_hash(
    shard_id: ShardId,
    height: u64,
    parent_hash: &Hash,
    timestamp: u64,
    producer: &str,
    tx_root: &Hash,
) -> Hash {
    let mut preimage = Vec::with_capacity(128);
    preimage.push(shard_id);
    preimage.extend_from_slice(&height.to_le_bytes());
    preimage.extend_from_slice(parent_hash.as_bytes());
    preimage.extend_from_slice(&timestamp.to_le_bytes());
    preimage.extend_from_slice(producer.as_bytes());
    preimage.extend_from_slice(tx_root.as_bytes());
    Hash::new(blake3_hash(&preimage))
}

/// Merkle root over the transaction hashes, zero for an empty block.
pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    merkle_root(&leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NATIVE_TOKEN_ID, TX_VERSION};
    use crate::transaction::PrivacyTx;

    fn make_test_tx(shard_id: ShardId, lock_time: u64) -> Transaction {
        Transaction::Normal(PrivacyTx {
            version: TX_VERSION,
            lock_time,
            fee: 0,
            has_privacy: false,
            token_id: NATIVE_TOKEN_ID,
            shard_id,
            info: Vec::new(),
            proof: None,
            sig_public_key: Vec::new(),
            sig: Vec::new(),
        })
    }

    #[test]
    fn genesis_block_verifies() {
        let genesis = Block::genesis(3, vec![]);
        assert_eq!(genesis.height(), 0);
        assert_eq!(genesis.shard_id(), 3);
        assert_eq!(genesis.header.parent_hash, Hash::zero());
        genesis.verify().unwrap();
    }

    #[test]
    fn genesis_hash_differs_per_shard() {
        assert_ne!(Block::genesis(0, vec![]).header.hash, Block::genesis(1, vec![]).header.hash);
        assert_eq!(Block::genesis(0, vec![]).header.hash, Block::genesis(0, vec![]).header.hash);
    }

    #[test]
    fn new_block_links_to_parent() {
        let genesis = Block::genesis(1, vec![]);
        let block = Block::new(&genesis, vec![make_test_tx(1, 5)], "producer".into());
        assert_eq!(block.height(), 1);
        assert_eq!(block.shard_id(), 1);
        assert_eq!(block.header.parent_hash, genesis.header.hash);
        block.verify().unwrap();
    }

    #[test]
    fn tampered_transactions_fail_verification() {
        let genesis = Block::genesis(0, vec![]);
        let mut block = Block::new(&genesis, vec![make_test_tx(0, 1)], "p".into());
        block.transactions.push(make_test_tx(0, 2));
        let err = block.verify().unwrap_err();
        assert!(err.contains("tx_root"), "{err}");
    }

    #[test]
    fn tampered_header_fails_verification() {
        let mut block = Block::genesis(0, vec![]);
        block.header.producer = "mallory".into();
        assert!(block.verify().unwrap_err().contains("hash mismatch"));
    }

    #[test]
    fn foreign_shard_transaction_rejected() {
        let genesis = Block::genesis(0, vec![]);
        let block = Block::new(&genesis, vec![make_test_tx(4, 1)], "p".into());
        assert!(block.verify().unwrap_err().contains("another shard"));
    }

    #[test]
    fn empty_block_has_zero_tx_root() {
        assert_eq!(compute_tx_root(&[]), Hash::zero());
    }

    #[test]
    fn block_serialization_roundtrip() {
        let genesis = Block::genesis(2, vec![make_test_tx(2, 9)]);
        let bytes = bincode::serialize(&genesis).unwrap();
        let back: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, genesis);
        back.verify().unwrap();
    }
}
