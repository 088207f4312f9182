//! Fee-ordered pool of verified transactions awaiting a block.
//!
//! Pending transactions are indexed by hash for O(1) lookups and sorted by
//! fee per kilobyte in a B-tree for block proposal. A second index maps
//! every pending serial number to the transaction spending it, so a pool
//! double spend is found without scanning.
//!
//! ## Design
//!
//! - `DashMap` serves the read-heavy paths (lookups, duplicate checks).
//! - `parking_lot::RwLock<BTreeMap>` protects the fee index.
//! - Admission holds a mutex from the pool double-spend check through the
//!   insert, so two conflicting transactions cannot both get in.
//! - When full, the lowest fee density is evicted for a strictly better
//!   incoming transaction.

use std::collections::BTreeMap;
use std::fmt;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{LedgerConfig, ShardId, DEFAULT_MIN_FEE_PER_KB, DEFAULT_POOL_MAX_SIZE};
use crate::crypto::hash::Hash;
use crate::storage::{Block, LedgerView};
use crate::transaction::{DoubleSpendLayer, TokenTxKind, Transaction, TxError, Validation, VerifyContext};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    /// Fee floor per started kilobyte.
    pub min_fee_per_kb: u64,
    /// Seconds after which [`TxPool::expire_old`] drops an entry.
    pub expiry_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            min_fee_per_kb: DEFAULT_MIN_FEE_PER_KB,
            expiry_seconds: 3600,
        }
    }
}

impl From<&LedgerConfig> for PoolConfig {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_size: config.pool_max_size,
            min_fee_per_kb: config.min_fee_per_kb,
            ..Self::default()
        }
    }
}

/// Smallest fee a transaction of `size` bytes may pay.
pub fn required_fee(size: usize, min_fee_per_kb: u64) -> u64 {
    let kilobytes = size.div_ceil(1024).max(1) as u64;
    min_fee_per_kb.saturating_mul(kilobytes)
}

/// Sorted by fee density descending, then age, then hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FeeKey {
    inverted_fee_per_kb: u64,
    added_at: u64,
    hash: Hash,
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub transaction: Transaction,
    pub added_at: u64,
    pub fee_per_kb: u64,
}

impl PoolEntry {
    fn fee_key(&self, hash: Hash) -> FeeKey {
        FeeKey {
            inverted_fee_per_kb: u64::MAX - self.fee_per_kb,
            added_at: self.added_at,
            hash,
        }
    }
}

/// `(token ID, shard, serial number bytes)`.
type SerialKey = (Hash, ShardId, [u8; 32]);

fn serial_keys(tx: &Transaction) -> Vec<SerialKey> {
    tx.privacy_txs()
        .into_iter()
        .flat_map(|p| p.serial_numbers().iter().map(move |sn| (p.token_id, p.shard_id, sn.to_bytes())))
        .collect()
}

/// Property ID of the token `tx` creates, if it is an Init.
fn created_token(tx: &Transaction) -> Option<Hash> {
    match tx {
        Transaction::CustomToken(t) if t.kind() == TokenTxKind::Init => Some(*t.property_id()),
        Transaction::PrivacyToken(t) if t.kind() == TokenTxKind::Init => Some(*t.property_id()),
        _ => None,
    }
}

pub struct TxPool {
    entries: DashMap<Hash, PoolEntry>,
    fee_index: RwLock<BTreeMap<FeeKey, Hash>>,
    spent_serials: DashMap<SerialKey, Hash>,
    admission: Mutex<()>,
    config: PoolConfig,
}

impl fmt::Debug for TxPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxPool")
            .field("size", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl TxPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            entries: DashMap::new(),
            fee_index: RwLock::new(BTreeMap::new()),
            spent_serials: DashMap::new(),
            admission: Mutex::new(()),
            config,
        }
    }

    /// Verify `tx` against `ledger` and admit it.
    ///
    /// Checks, in order: duplicate, sanity, fee floor, proofs (as a new
    /// transaction), pool double spend and pending Init of the same
    /// property ID, ledger double spend, capacity.
    pub fn add<L: LedgerView + ?Sized>(&self, tx: Transaction, ledger: &L) -> Result<Hash, TxError> {
        let hash = tx.hash();
        if self.entries.contains_key(&hash) {
            return Err(TxError::DuplicateTransaction(hash));
        }
        let result = self.admit(hash, tx, ledger);
        if let Err(e) = &result {
            warn!(tx = %hash, error = %e, "pool rejected transaction");
        }
        result
    }

    fn admit<L: LedgerView + ?Sized>(&self, hash: Hash, tx: Transaction, ledger: &L) -> Result<Hash, TxError> {
        tx.validate_sanity()?;

        let size = tx.size();
        let required = required_fee(size, self.config.min_fee_per_kb);
        if tx.fee() < required {
            return Err(TxError::FeeTooLow {
                fee: tx.fee(),
                required,
                size,
            });
        }

        tx.verify_proof(ledger, &VerifyContext::new_transaction(tx.shard_id()))?;

        let _admission = self.admission.lock();
        self.check_pool_double_spend(&tx)?;
        tx.validate_against_ledger(ledger)?;

        let fee_per_kb = tx.fee() / size.div_ceil(1024).max(1) as u64;
        if self.entries.len() >= self.config.max_size && !self.try_evict_lowest(fee_per_kb) {
            return Err(TxError::PoolFull(self.config.max_size));
        }

        let entry = PoolEntry {
            transaction: tx,
            added_at: current_timestamp_secs(),
            fee_per_kb,
        };
        for key in serial_keys(&entry.transaction) {
            self.spent_serials.insert(key, hash);
        }
        self.fee_index.write().insert(entry.fee_key(hash), hash);
        debug!(tx = %hash, kind = entry.transaction.kind_name(), fee_per_kb, "pool admitted transaction");
        self.entries.insert(hash, entry);
        Ok(hash)
    }

    fn check_pool_double_spend(&self, tx: &Transaction) -> Result<(), TxError> {
        for key in serial_keys(tx) {
            if let Some(holder) = self.spent_serials.get(&key) {
                return Err(TxError::DoubleSpendDetected {
                    layer: DoubleSpendLayer::Pool,
                    detail: format!(
                        "serial number {} already spent by pending {}",
                        hex::encode(key.2),
                        *holder
                    ),
                });
            }
        }
        if let Some(token_tx) = tx.as_custom_token() {
            let pending: Vec<_> = self
                .entries
                .iter()
                .filter_map(|e| e.transaction.as_custom_token().cloned())
                .collect();
            token_tx.check_pool_double_spend(&pending)?;
        }
        if let Some(property_id) = created_token(tx) {
            if self.pending_init(&property_id).is_some() {
                return Err(TxError::TokenAlreadyExists(property_id));
            }
        }
        Ok(())
    }

    fn pending_init(&self, property_id: &Hash) -> Option<Hash> {
        self.entries
            .iter()
            .find(|e| created_token(&e.transaction).as_ref() == Some(property_id))
            .map(|e| *e.key())
    }

    pub fn remove(&self, hash: &Hash) -> Option<Transaction> {
        let (_, entry) = self.entries.remove(hash)?;
        self.fee_index.write().remove(&entry.fee_key(*hash));
        for key in serial_keys(&entry.transaction) {
            self.spent_serials.remove_if(&key, |_, holder| holder == hash);
        }
        Some(entry.transaction)
    }

    /// Drop everything `block` settled, plus pending transactions that now
    /// conflict with it. Returns how many entries left the pool.
    pub fn remove_included(&self, block: &Block) -> usize {
        let mut removed = 0;
        for tx in &block.transactions {
            let hash = tx.hash();
            if self.remove(&hash).is_some() {
                removed += 1;
            }
            for key in serial_keys(tx) {
                let conflicting = self.spent_serials.get(&key).map(|holder| *holder);
                if let Some(conflicting) = conflicting {
                    if self.remove(&conflicting).is_some() {
                        removed += 1;
                    }
                }
            }
            if let Some(token_tx) = tx.as_custom_token() {
                let conflicting: Vec<Hash> = self
                    .entries
                    .iter()
                    .filter(|e| e.transaction.as_custom_token().is_some_and(|p| p.conflicts_with(token_tx)))
                    .map(|e| *e.key())
                    .collect();
                for hash in conflicting {
                    if self.remove(&hash).is_some() {
                        removed += 1;
                    }
                }
            }
            if let Some(property_id) = created_token(tx) {
                while let Some(rival) = self.pending_init(&property_id) {
                    if self.remove(&rival).is_none() {
                        break;
                    }
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.entries.get(hash).map(|e| e.transaction.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Up to `max_count` transactions, highest fee density first.
    pub fn select_transactions(&self, max_count: usize) -> Vec<Transaction> {
        let index = self.fee_index.read();
        index
            .values()
            .filter_map(|hash| self.entries.get(hash).map(|e| e.transaction.clone()))
            .take(max_count)
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than `expiry_seconds`, returning how many.
    pub fn expire_old(&self) -> usize {
        let cutoff = current_timestamp_secs().saturating_sub(self.config.expiry_seconds);
        let expired: Vec<Hash> = self
            .entries
            .iter()
            .filter(|e| e.value().added_at < cutoff)
            .map(|e| *e.key())
            .collect();
        expired.iter().filter(|hash| self.remove(hash).is_some()).count()
    }

    fn try_evict_lowest(&self, incoming_fee_per_kb: u64) -> bool {
        let lowest = {
            let index = self.fee_index.read();
            match index.iter().next_back() {
                Some((key, hash)) => (u64::MAX - key.inverted_fee_per_kb, *hash),
                None => return false,
            }
        };
        if incoming_fee_per_kb <= lowest.0 {
            return false;
        }
        self.remove(&lowest.1).is_some()
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn current_timestamp_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
