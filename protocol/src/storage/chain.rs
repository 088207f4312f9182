//! Per-shard chain management.
//!
//! Each shard has its own tip behind a `parking_lot::RwLock`. Readers take
//! a [`ShardSnapshot`], which holds the read side of the lock, so the shard
//! cannot advance while they look at it. [`BlockChain::connect_block`]
//! verifies the block's transactions in parallel under an upgradable read
//! and only upgrades to the write lock for the atomic persist.

use std::sync::Arc;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};
use rayon::prelude::*;
use tracing::{info, warn};

use super::block::Block;
use super::db::LedgerDb;
use super::store::{ChainRetriever, CommitmentStore, StoreError, StoreResult};
use super::view::TxViewPoint;
use crate::config::ShardId;
use crate::crypto::hash::Hash;
use crate::privacy::Coin;
use crate::transaction::{CustomTokenTx, Transaction, TxError, Validation, VerifyContext};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("shard {0} is not tracked by this node")]
    UnknownShard(ShardId),

    #[error("shard {shard_id} expects height {expected}, got {got}")]
    HeightMismatch { shard_id: ShardId, expected: u64, got: u64 },

    #[error("block {height} of shard {shard_id} does not extend the tip {tip}")]
    ParentMismatch { shard_id: ShardId, height: u64, tip: Hash },

    #[error("transaction {index} of block {height}: {source}")]
    Transaction {
        height: u64,
        index: usize,
        #[source]
        source: TxError,
    },

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build verification pool: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Clone, Copy)]
struct ShardTip {
    height: Option<u64>,
    hash: Hash,
}

/// The chains of every shard this node tracks, over one shared database.
pub struct BlockChain {
    db: Arc<LedgerDb>,
    shards: Vec<RwLock<ShardTip>>,
    verifier: rayon::ThreadPool,
}

impl BlockChain {
    /// Load the tips of shards `0..shard_count` from `db`.
    ///
    /// `verification_threads` of zero lets rayon pick.
    pub fn open(db: Arc<LedgerDb>, shard_count: usize, verification_threads: usize) -> Result<Self, ChainError> {
        let mut shards = Vec::with_capacity(shard_count);
        for shard_id in 0..shard_count {
            let shard_id = shard_id as ShardId;
            let tip = match db.best_height(shard_id)? {
                Some(height) => {
                    let block = db.block(shard_id, height)?.ok_or_else(|| {
                        StoreError::Corrupt(format!("best block {height} of shard {shard_id} is missing"))
                    })?;
                    ShardTip {
                        height: Some(height),
                        hash: block.header.hash,
                    }
                }
                None => ShardTip {
                    height: None,
                    hash: Hash::zero(),
                },
            };
            shards.push(RwLock::new(tip));
        }
        let verifier = rayon::ThreadPoolBuilder::new()
            .num_threads(verification_threads)
            .thread_name(|i| format!("verify-{i}"))
            .build()
            .map_err(|e| ChainError::ThreadPool(e.to_string()))?;
        Ok(Self { db, shards, verifier })
    }

    pub fn db(&self) -> &Arc<LedgerDb> {
        &self.db
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, shard_id: ShardId) -> Result<&RwLock<ShardTip>, ChainError> {
        self.shards
            .get(shard_id as usize)
            .ok_or(ChainError::UnknownShard(shard_id))
    }

    /// Height of the shard's tip, `None` before genesis.
    pub fn best_height(&self, shard_id: ShardId) -> Result<Option<u64>, ChainError> {
        Ok(self.shard(shard_id)?.read().height)
    }

    /// A consistent read view of one shard.
    pub fn snapshot(&self, shard_id: ShardId) -> Result<ShardSnapshot<'_>, ChainError> {
        let tip = self.shard(shard_id)?.read();
        Ok(ShardSnapshot {
            shard_id,
            tip,
            db: &self.db,
        })
    }

    /// Verify `block` against its shard and persist it.
    ///
    /// Height 0 is verified with mints allowed. Every later block is
    /// verified as new work. Nothing is written unless every transaction
    /// passes and the view persists.
    pub fn connect_block(&self, block: &Block) -> Result<(), ChainError> {
        let shard_id = block.shard_id();
        let lock = self.shard(shard_id)?;
        block.verify().map_err(ChainError::InvalidBlock)?;

        let tip = lock.upgradable_read();
        let expected = tip.height.map_or(0, |h| h + 1);
        if block.height() != expected {
            return Err(ChainError::HeightMismatch {
                shard_id,
                expected,
                got: block.height(),
            });
        }
        if block.header.parent_hash != tip.hash {
            return Err(ChainError::ParentMismatch {
                shard_id,
                height: block.height(),
                tip: tip.hash,
            });
        }

        let ctx = if block.height() == 0 {
            VerifyContext::genesis(shard_id)
        } else {
            VerifyContext::new_transaction(shard_id)
        };
        self.verify_transactions(block, &ctx)?;
        let view = TxViewPoint::from_block(block)?;

        let mut tip = RwLockUpgradableReadGuard::upgrade(tip);
        self.db.apply_view(block, &view).map_err(|e| {
            warn!(shard = shard_id, height = block.height(), error = %e, "block rejected at persist");
            ChainError::from(TxError::from(e))
        })?;
        *tip = ShardTip {
            height: Some(block.height()),
            hash: block.header.hash,
        };

        info!(
            shard = shard_id,
            height = block.height(),
            hash = %block.header.hash,
            txs = block.tx_count(),
            new_tokens = view.new_tokens.len(),
            "block connected"
        );
        Ok(())
    }

    fn verify_transactions(&self, block: &Block, ctx: &VerifyContext) -> Result<(), ChainError> {
        let db: &LedgerDb = &self.db;
        self.verifier.install(|| {
            block
                .transactions
                .par_iter()
                .enumerate()
                .try_for_each(|(index, tx)| {
                    tx.validate(db, ctx).map_err(|source| ChainError::Transaction {
                        height: block.height(),
                        index,
                        source,
                    })
                })
        })
    }
}

/// Read access to one shard, pinned at its current tip.
pub struct ShardSnapshot<'a> {
    shard_id: ShardId,
    tip: RwLockReadGuard<'a, ShardTip>,
    db: &'a LedgerDb,
}

impl ShardSnapshot<'_> {
    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn best_height(&self) -> Option<u64> {
        self.tip.height
    }

    pub fn best_hash(&self) -> Hash {
        self.tip.hash
    }

    pub fn db(&self) -> &LedgerDb {
        self.db
    }
}

impl CommitmentStore for ShardSnapshot<'_> {
    fn has_commitment_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<bool> {
        self.db.has_commitment_index(token_id, index, shard_id)
    }

    fn commitment_count(&self, token_id: &Hash, shard_id: ShardId) -> StoreResult<u64> {
        self.db.commitment_count(token_id, shard_id)
    }

    fn commitment_by_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<Option<Coin>> {
        self.db.commitment_by_index(token_id, index, shard_id)
    }

    fn commitment_index(
        &self,
        token_id: &Hash,
        commitment: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<Option<u64>> {
        self.db.commitment_index(token_id, commitment, shard_id)
    }

    fn has_serial_number(
        &self,
        token_id: &Hash,
        serial_number: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<bool> {
        self.db.has_serial_number(token_id, serial_number, shard_id)
    }

    fn has_snd(&self, token_id: &Hash, snd: &Scalar, shard_id: ShardId) -> StoreResult<bool> {
        self.db.has_snd(token_id, snd, shard_id)
    }

    fn token_exists(&self, token_id: &Hash) -> StoreResult<bool> {
        self.db.token_exists(token_id)
    }
}

impl ChainRetriever for ShardSnapshot<'_> {
    fn transaction_by_hash(&self, hash: &Hash) -> StoreResult<Option<Transaction>> {
        self.db.transaction_by_hash(hash)
    }

    fn custom_token_txs(&self, property_id: &Hash) -> StoreResult<Vec<CustomTokenTx>> {
        self.db.custom_token_txs(property_id)
    }
}
