//! # LedgerDb: Persistent Ledger Storage
//!
//! The persistence layer of the ledger, built on sled's embedded key-value
//! store. Everything lives in one tree, `ledger`, so a whole block can be
//! committed with a single atomic [`Batch`]. The key layout is documented
//! in [`super::keys`].
//!
//! ## Atomicity
//!
//! [`LedgerDb::apply_view`] stages every write of a block (serial numbers,
//! commitments, SNDs, token records, token history, the transactions and
//! the block itself) into one batch. If any check fails while staging,
//! nothing is written. Token-history updates inside one block see each
//! other through an in-memory overlay before they reach the batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Db, Tree};
use tracing::debug;

use super::block::Block;
use super::keys::{self, Tag, TokenHistoryKey, TokenHistoryValue};
use super::store::{ChainRetriever, CommitmentStore, StoreError, StoreResult};
use super::view::{CoinView, TokenRecord, TxViewPoint};
use crate::config::{ShardId, REWARD_SNAPSHOT_INTERVAL};
use crate::crypto::hash::Hash;
use crate::crypto::keys::PaymentAddress;
use crate::privacy::Coin;
use crate::transaction::{CustomTokenTx, Transaction};

/// Holder balances keyed by base58 spend key.
pub type HolderBalances = BTreeMap<String, u64>;

/// An unspent custom-token output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnspentTokenVout {
    pub utxo: Hash,
    pub vout_index: u8,
    pub amount: u64,
    pub rewarded: bool,
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Persistent storage engine of the ledger.
///
/// sled handles concurrent reads. Writers that read-modify-write (commitment
/// counters, token history) serialize on an internal mutex, so `LedgerDb`
/// can be shared across shards via `Arc<LedgerDb>`.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    ledger: Tree,
    write_lock: Arc<Mutex<()>>,
}

impl LedgerDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory database removed on drop. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let ledger = db.open_tree("ledger")?;
        Ok(Self {
            db,
            ledger,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        match self.ledger.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> StoreResult<Vec<T>> {
        self.ledger
            .scan_prefix(prefix)
            .map(|entry| {
                let (_, bytes) = entry?;
                decode(&bytes)
            })
            .collect()
    }

    // -- Commitment ledger --------------------------------------------------

    /// Mark `serial_numbers` spent. Fails without writing if any of them is
    /// already stored or repeated.
    pub fn store_serial_numbers(
        &self,
        token_id: &Hash,
        shard_id: ShardId,
        serial_numbers: &[CompressedRistretto],
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut batch = Batch::default();
        self.stage_serial_numbers(&mut batch, token_id, shard_id, serial_numbers)?;
        self.ledger.apply_batch(batch)?;
        Ok(())
    }

    /// Append `coins` to the commitment index of `(token_id, shard_id)`.
    pub fn store_commitments(&self, token_id: &Hash, shard_id: ShardId, coins: &[Coin]) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut batch = Batch::default();
        let count = self.commitment_count(token_id, shard_id)?;
        let next = self.stage_commitments(&mut batch, token_id, shard_id, coins, count)?;
        batch.insert(keys::commitment_count(token_id, shard_id), next.to_be_bytes().to_vec());
        self.ledger.apply_batch(batch)?;
        Ok(())
    }

    pub fn store_snds(&self, token_id: &Hash, shard_id: ShardId, snds: &[Scalar]) -> StoreResult<()> {
        let mut batch = Batch::default();
        for snd in snds {
            batch.insert(keys::snd(token_id, shard_id, snd), Vec::<u8>::new());
        }
        self.ledger.apply_batch(batch)?;
        Ok(())
    }

    fn stage_serial_numbers(
        &self,
        batch: &mut Batch,
        token_id: &Hash,
        shard_id: ShardId,
        serial_numbers: &[CompressedRistretto],
    ) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for sn in serial_numbers {
            if !seen.insert(sn.to_bytes()) || self.has_serial_number(token_id, sn, shard_id)? {
                return Err(StoreError::DuplicateSerialNumber {
                    token_id: *token_id,
                    shard_id,
                    serial_number: hex::encode(sn.as_bytes()),
                });
            }
            batch.insert(keys::serial_number(token_id, shard_id, sn), Vec::<u8>::new());
        }
        Ok(())
    }

    /// Stage `coins` at indexes `first..`, returning the next free index.
    /// The caller writes the new count.
    fn stage_commitments(
        &self,
        batch: &mut Batch,
        token_id: &Hash,
        shard_id: ShardId,
        coins: &[Coin],
        first: u64,
    ) -> StoreResult<u64> {
        let mut index = first;
        for coin in coins {
            let record = encode(coin)?;
            batch.insert(keys::commitment_index(token_id, shard_id, &coin.commitment), index.to_be_bytes().to_vec());
            batch.insert(keys::coin(token_id, shard_id, index), record.clone());
            batch.insert(keys::output_coin(token_id, shard_id, &coin.public_key, index), record);
            index += 1;
        }
        Ok(index)
    }

    fn stage_coin_view(
        &self,
        batch: &mut Batch,
        token_id: &Hash,
        shard_id: ShardId,
        view: &CoinView,
    ) -> StoreResult<()> {
        self.stage_serial_numbers(batch, token_id, shard_id, &view.serial_numbers)?;
        let mut next = self.commitment_count(token_id, shard_id)?;
        for coins in view.commitments.values() {
            next = self.stage_commitments(batch, token_id, shard_id, coins, next)?;
        }
        batch.insert(keys::commitment_count(token_id, shard_id), next.to_be_bytes().to_vec());
        for snd in &view.snds {
            batch.insert(keys::snd(token_id, shard_id, snd), Vec::<u8>::new());
        }
        Ok(())
    }

    /// Every coin ever paid to the one-time key `owner`.
    pub fn output_coins(
        &self,
        token_id: &Hash,
        shard_id: ShardId,
        owner: &CompressedRistretto,
    ) -> StoreResult<Vec<Coin>> {
        self.scan(&keys::output_coins_of(token_id, shard_id, owner))
    }

    // -- Tokens ---------------------------------------------------------------

    /// Record a token. Overwrites an existing record of the same ID.
    pub fn register_token(&self, token: impl Into<TokenRecord>) -> StoreResult<()> {
        let record: TokenRecord = token.into();
        self.ledger.insert(keys::token(&record.property_id), encode(&record)?)?;
        Ok(())
    }

    pub fn token(&self, property_id: &Hash) -> StoreResult<Option<TokenRecord>> {
        self.get(&keys::token(property_id))
    }

    /// Every known token, ordered by property ID.
    pub fn tokens(&self) -> StoreResult<Vec<TokenRecord>> {
        self.scan(&[Tag::Token as u8])
    }

    fn token_history(&self, property_id: &Hash) -> StoreResult<BTreeMap<Vec<u8>, TokenHistoryValue>> {
        self.ledger
            .scan_prefix(keys::token_history_prefix(property_id))
            .map(|entry| {
                let (key, value) = entry?;
                Ok((key.to_vec(), TokenHistoryValue::decode(&value)?))
            })
            .collect()
    }

    /// Unspent outputs of `property_id` held by `address`.
    pub fn unspent_token_vouts(
        &self,
        property_id: &Hash,
        address: &PaymentAddress,
    ) -> StoreResult<Vec<UnspentTokenVout>> {
        let mut vouts = Vec::new();
        for entry in self.ledger.scan_prefix(keys::token_history_address_prefix(property_id, address)) {
            let (key, value) = entry?;
            let value = TokenHistoryValue::decode(&value)?;
            if value.spent {
                continue;
            }
            let key = TokenHistoryKey::parse(property_id, &key)?;
            vouts.push(UnspentTokenVout {
                utxo: key.utxo,
                vout_index: key.vout_index,
                amount: value.amount,
                rewarded: value.rewarded,
            });
        }
        Ok(vouts)
    }

    /// Unspent balance of every holder of `property_id`.
    pub fn token_holders(&self, property_id: &Hash) -> StoreResult<HolderBalances> {
        holder_balances(property_id, &self.token_history(property_id)?, false)
    }

    /// Holder balances captured at `height`, if a snapshot was taken there.
    pub fn reward_snapshot(&self, property_id: &Hash, height: u64) -> StoreResult<Option<HolderBalances>> {
        self.get(&keys::reward_snapshot(property_id, height))
    }

    /// Flag an unspent output as rewarded so later snapshots skip it.
    pub fn mark_token_output_rewarded(
        &self,
        property_id: &Hash,
        address: &PaymentAddress,
        utxo: &Hash,
        vout_index: u8,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let key = keys::token_history_key(property_id, address, utxo, vout_index);
        let unavailable = || StoreError::TokenOutputUnavailable {
            property_id: *property_id,
            utxo: *utxo,
            vout_index: u32::from(vout_index),
        };
        let bytes = self.ledger.get(&key)?.ok_or_else(unavailable)?;
        let mut value = TokenHistoryValue::decode(&bytes)?;
        if value.spent {
            return Err(unavailable());
        }
        value.rewarded = true;
        self.ledger.insert(key, value.encode())?;
        Ok(())
    }

    // -- Blocks -----------------------------------------------------------------

    pub fn best_height(&self, shard_id: ShardId) -> StoreResult<Option<u64>> {
        match self.ledger.get(keys::best_height(shard_id))? {
            Some(bytes) => Ok(Some(keys::decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block(&self, shard_id: ShardId, height: u64) -> StoreResult<Option<Block>> {
        self.get(&keys::block(shard_id, height))
    }

    /// Persist `block` and everything `view` collected from it in one
    /// atomic batch.
    ///
    /// Fails without writing anything on a serial number already stored, a
    /// token vin whose output is spent or unknown, or a token vout that
    /// already exists.
    pub fn apply_view(&self, block: &Block, view: &TxViewPoint) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let shard_id = view.shard_id;
        let height = view.height;
        let mut batch = Batch::default();

        for (token_id, coins) in view.coin_views() {
            if !coins.is_empty() {
                self.stage_coin_view(&mut batch, &token_id, shard_id, coins)?;
            }
        }

        for token in &view.new_tokens {
            if !self.token_exists(&token.property_id)? {
                batch.insert(keys::token(&token.property_id), encode(token)?);
            }
        }

        let mut history = HistoryOverlay::new(self);
        for (position, tx) in &view.custom_token_txs {
            history.apply(tx)?;
            batch.insert(keys::token_tx(tx.property_id(), height, *position), tx.hash().as_bytes().to_vec());
        }
        for (position, tx) in &view.privacy_token_txs {
            batch.insert(keys::token_tx(tx.property_id(), height, *position), tx.hash().as_bytes().to_vec());
        }
        if height % REWARD_SNAPSHOT_INTERVAL == 0 {
            for property_id in view.custom_token_properties() {
                let snapshot = history.unrewarded_balances(&property_id)?;
                batch.insert(keys::reward_snapshot(&property_id, height), encode(&snapshot)?);
            }
        }
        history.stage(&mut batch);

        for tx in &block.transactions {
            batch.insert(keys::transaction(&tx.hash()), encode(tx)?);
        }
        batch.insert(keys::block(shard_id, height), encode(block)?);
        batch.insert(keys::best_height(shard_id), height.to_be_bytes().to_vec());

        self.ledger.apply_batch(batch)?;
        self.db.flush()?;
        debug!(
            shard = shard_id,
            height,
            txs = block.transactions.len(),
            new_tokens = view.new_tokens.len(),
            "block view persisted"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Token history overlay
// ---------------------------------------------------------------------------

/// Pending history writes of one block, read through to the database.
struct HistoryOverlay<'a> {
    db: &'a LedgerDb,
    pending: HashMap<Vec<u8>, TokenHistoryValue>,
}

impl<'a> HistoryOverlay<'a> {
    fn new(db: &'a LedgerDb) -> Self {
        Self {
            db,
            pending: HashMap::new(),
        }
    }

    fn lookup(&self, key: &[u8]) -> StoreResult<Option<TokenHistoryValue>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(Some(*value));
        }
        match self.db.ledger.get(key)? {
            Some(bytes) => Ok(Some(TokenHistoryValue::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Spend every vin and create every vout of `tx`.
    fn apply(&mut self, tx: &CustomTokenTx) -> StoreResult<()> {
        let property_id = tx.property_id();
        for vin in &tx.token_data().vins {
            let unavailable = || StoreError::TokenOutputUnavailable {
                property_id: *property_id,
                utxo: vin.tx_custom_token_id,
                vout_index: vin.vout_index,
            };
            let index = u8::try_from(vin.vout_index).map_err(|_| unavailable())?;
            let key = keys::token_history_key(property_id, &vin.payment_address, &vin.tx_custom_token_id, index);
            match self.lookup(&key)? {
                Some(mut value) if !value.spent => {
                    value.spent = true;
                    self.pending.insert(key, value);
                }
                _ => return Err(unavailable()),
            }
        }
        for (index, vout) in tx.token_data().vouts.iter().enumerate() {
            let exists = || StoreError::TokenOutputExists {
                property_id: *property_id,
                utxo: tx.hash(),
                vout_index: index as u32,
            };
            let index = u8::try_from(index).map_err(|_| exists())?;
            let key = keys::token_history_key(property_id, &vout.payment_address, &tx.hash(), index);
            if self.lookup(&key)?.is_some() {
                return Err(exists());
            }
            self.pending.insert(key, TokenHistoryValue::unspent(vout.value));
        }
        Ok(())
    }

    fn unrewarded_balances(&self, property_id: &Hash) -> StoreResult<HolderBalances> {
        let mut history = self.db.token_history(property_id)?;
        let prefix = keys::token_history_prefix(property_id);
        for (key, value) in &self.pending {
            if key.starts_with(&prefix) {
                history.insert(key.clone(), *value);
            }
        }
        holder_balances(property_id, &history, true)
    }

    fn stage(self, batch: &mut Batch) {
        for (key, value) in self.pending {
            batch.insert(key, value.encode());
        }
    }
}

fn holder_balances(
    property_id: &Hash,
    history: &BTreeMap<Vec<u8>, TokenHistoryValue>,
    unrewarded_only: bool,
) -> StoreResult<HolderBalances> {
    let mut balances = HolderBalances::new();
    for (key, value) in history {
        if value.spent || (unrewarded_only && value.rewarded) {
            continue;
        }
        let key = TokenHistoryKey::parse(property_id, key)?;
        let balance = balances.entry(key.address).or_insert(0);
        *balance = balance.saturating_add(value.amount);
    }
    Ok(balances)
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

impl CommitmentStore for LedgerDb {
    fn has_commitment_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<bool> {
        Ok(self.ledger.contains_key(keys::coin(token_id, shard_id, index))?)
    }

    fn commitment_count(&self, token_id: &Hash, shard_id: ShardId) -> StoreResult<u64> {
        match self.ledger.get(keys::commitment_count(token_id, shard_id))? {
            Some(bytes) => keys::decode_u64(&bytes),
            None => Ok(0),
        }
    }

    fn commitment_by_index(&self, token_id: &Hash, index: u64, shard_id: ShardId) -> StoreResult<Option<Coin>> {
        self.get(&keys::coin(token_id, shard_id, index))
    }

    fn commitment_index(
        &self,
        token_id: &Hash,
        commitment: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<Option<u64>> {
        match self.ledger.get(keys::commitment_index(token_id, shard_id, commitment))? {
            Some(bytes) => Ok(Some(keys::decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    fn has_serial_number(
        &self,
        token_id: &Hash,
        serial_number: &CompressedRistretto,
        shard_id: ShardId,
    ) -> StoreResult<bool> {
        Ok(self.ledger.contains_key(keys::serial_number(token_id, shard_id, serial_number))?)
    }

    fn has_snd(&self, token_id: &Hash, snd: &Scalar, shard_id: ShardId) -> StoreResult<bool> {
        Ok(self.ledger.contains_key(keys::snd(token_id, shard_id, snd))?)
    }

    fn token_exists(&self, token_id: &Hash) -> StoreResult<bool> {
        Ok(self.ledger.contains_key(keys::token(token_id))?)
    }
}

impl ChainRetriever for LedgerDb {
    fn transaction_by_hash(&self, hash: &Hash) -> StoreResult<Option<Transaction>> {
        self.get(&keys::transaction(hash))
    }

    fn custom_token_txs(&self, property_id: &Hash) -> StoreResult<Vec<CustomTokenTx>> {
        let mut txs = Vec::new();
        for entry in self.ledger.scan_prefix(keys::token_txs_of(property_id)) {
            let (_, hash) = entry?;
            let hash: [u8; 32] = hash
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Corrupt("token tx index holds a bad hash".into()))?;
            match self.transaction_by_hash(&Hash::new(hash))? {
                Some(Transaction::CustomToken(tx)) => txs.push(tx),
                Some(_) => {}
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "token tx index points at missing tx {}",
                        Hash::new(hash)
                    )))
                }
            }
        }
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NATIVE_TOKEN_ID, TX_VERSION};
    use crate::crypto::keys::KeySet;
    use crate::transaction::{PrivacyTx, TokenIdentity, TxTokenVin, TxTokenVout, UtxoSet};
    use rand::rngs::OsRng;

    const SHARD: ShardId = 1;

    fn coin(byte: u8) -> Coin {
        Coin {
            public_key: CompressedRistretto([byte; 32]),
            commitment: CompressedRistretto([byte.wrapping_add(100); 32]),
            snd: Scalar::random(&mut OsRng),
        }
    }

    fn fee_tx() -> PrivacyTx {
        PrivacyTx {
            version: TX_VERSION,
            lock_time: 0,
            fee: 0,
            has_privacy: false,
            token_id: NATIVE_TOKEN_ID,
            shard_id: SHARD,
            info: Vec::new(),
            proof: None,
            sig_public_key: Vec::new(),
            sig: Vec::new(),
        }
    }

    fn identity() -> TokenIdentity {
        TokenIdentity {
            name: "Ledger Silver".into(),
            symbol: "LSLV".into(),
        }
    }

    fn commit(db: &LedgerDb, block: &Block) -> StoreResult<()> {
        let view = TxViewPoint::from_block(block).expect("view");
        db.apply_view(block, &view)
    }

    /// Genesis with a custom-token Init paying `amount` to `owner`.
    fn genesis_with_token(db: &LedgerDb, owner: &KeySet, amount: u64) -> (Block, CustomTokenTx) {
        let init = CustomTokenTx::create_init(fee_tx(), identity(), amount, owner.payment_address(), None, db)
            .unwrap();
        let genesis = Block::genesis(SHARD, vec![Transaction::CustomToken(init.clone())]);
        commit(db, &genesis).unwrap();
        (genesis, init)
    }

    fn spend(db: &LedgerDb, owner: &KeySet, from: &CustomTokenTx, to: &KeySet, amount: u64) -> CustomTokenTx {
        let vin = TxTokenVin::sign(owner, from.hash(), 0, &from.token_data().vouts[0]);
        let mut utxos = UtxoSet::new();
        utxos.insert(from.clone());
        CustomTokenTx::create_transfer(
            fee_tx(),
            identity(),
            *from.property_id(),
            vec![vin],
            &utxos,
            vec![TxTokenVout::new(to.payment_address(), amount)],
            db,
        )
        .unwrap()
    }

    #[test]
    fn commitments_get_sequential_indexes() {
        let db = LedgerDb::open_temporary().unwrap();
        db.store_commitments(&NATIVE_TOKEN_ID, SHARD, &[coin(1), coin(2)]).unwrap();
        db.store_commitments(&NATIVE_TOKEN_ID, SHARD, &[coin(3)]).unwrap();

        assert_eq!(db.commitment_count(&NATIVE_TOKEN_ID, SHARD).unwrap(), 3);
        let third = db.commitment_by_index(&NATIVE_TOKEN_ID, 2, SHARD).unwrap().unwrap();
        assert_eq!(third.public_key, coin(3).public_key);
        assert_eq!(
            db.commitment_index(&NATIVE_TOKEN_ID, &coin(2).commitment, SHARD).unwrap(),
            Some(1)
        );
        assert!(db.has_commitment_index(&NATIVE_TOKEN_ID, 0, SHARD).unwrap());
        assert!(!db.has_commitment_index(&NATIVE_TOKEN_ID, 3, SHARD).unwrap());
        // Other shards see nothing.
        assert_eq!(db.commitment_count(&NATIVE_TOKEN_ID, SHARD + 1).unwrap(), 0);
    }

    #[test]
    fn output_coins_found_by_owner() {
        let db = LedgerDb::open_temporary().unwrap();
        db.store_commitments(&NATIVE_TOKEN_ID, SHARD, &[coin(1), coin(2), coin(1)]).unwrap();
        let mine = db.output_coins(&NATIVE_TOKEN_ID, SHARD, &coin(1).public_key).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(db.output_coins(&NATIVE_TOKEN_ID, SHARD, &coin(9).public_key).unwrap().is_empty());
    }

    #[test]
    fn duplicate_serial_numbers_rejected_atomically() {
        let db = LedgerDb::open_temporary().unwrap();
        let a = CompressedRistretto([1; 32]);
        let b = CompressedRistretto([2; 32]);
        db.store_serial_numbers(&NATIVE_TOKEN_ID, SHARD, &[a]).unwrap();

        let err = db.store_serial_numbers(&NATIVE_TOKEN_ID, SHARD, &[b, a]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSerialNumber { .. }));
        assert!(!db.has_serial_number(&NATIVE_TOKEN_ID, &b, SHARD).unwrap());

        let err = db.store_serial_numbers(&NATIVE_TOKEN_ID, SHARD, &[b, b]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSerialNumber { .. }));

        // Same serial on another shard is a different record.
        db.store_serial_numbers(&NATIVE_TOKEN_ID, SHARD + 1, &[a]).unwrap();
    }

    #[test]
    fn snds_are_scoped_per_token() {
        let db = LedgerDb::open_temporary().unwrap();
        let snd = Scalar::random(&mut OsRng);
        db.store_snds(&NATIVE_TOKEN_ID, SHARD, &[snd]).unwrap();
        assert!(db.has_snd(&NATIVE_TOKEN_ID, &snd, SHARD).unwrap());
        assert!(!db.has_snd(&Hash::new([1; 32]), &snd, SHARD).unwrap());
    }

    #[test]
    fn init_block_registers_token_and_history() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let (_, init) = genesis_with_token(&db, &owner, 1_000);

        let record = db.token(init.property_id()).unwrap().unwrap();
        assert_eq!(record.symbol, "LSLV");
        assert_eq!(record.init_tx, init.hash());
        assert_eq!(db.tokens().unwrap().len(), 1);

        let unspent = db.unspent_token_vouts(init.property_id(), &owner.payment_address()).unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].amount, 1_000);
        assert_eq!(unspent[0].utxo, init.hash());
        assert_eq!(db.custom_token_txs(init.property_id()).unwrap(), vec![init.clone()]);
        assert_eq!(db.best_height(SHARD).unwrap(), Some(0));
        assert!(db.block(SHARD, 0).unwrap().is_some());
    }

    #[test]
    fn genesis_takes_reward_snapshot() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let (_, init) = genesis_with_token(&db, &owner, 70);
        let snapshot = db.reward_snapshot(init.property_id(), 0).unwrap().unwrap();
        assert_eq!(snapshot.get(&owner.payment_address().spend_key_base58()), Some(&70));
    }

    #[test]
    fn transfer_moves_history_and_balances() {
        let db = LedgerDb::open_temporary().unwrap();
        let alice = KeySet::generate();
        let bob = KeySet::generate();
        let (genesis, init) = genesis_with_token(&db, &alice, 100);

        let transfer = spend(&db, &alice, &init, &bob, 30);
        let block = Block::new(&genesis, vec![Transaction::CustomToken(transfer.clone())], "p".into());
        commit(&db, &block).unwrap();

        let holders = db.token_holders(init.property_id()).unwrap();
        assert_eq!(holders.get(&bob.payment_address().spend_key_base58()), Some(&30));
        assert_eq!(holders.get(&alice.payment_address().spend_key_base58()), Some(&70));
        let alice_vouts = db.unspent_token_vouts(init.property_id(), &alice.payment_address()).unwrap();
        assert_eq!(alice_vouts.len(), 1);
        assert_eq!(alice_vouts[0].utxo, transfer.hash());
        assert_eq!(db.custom_token_txs(init.property_id()).unwrap().len(), 2);
        // Height 1 is not a snapshot height.
        assert!(db.reward_snapshot(init.property_id(), 1).unwrap().is_none());
    }

    #[test]
    fn spent_vout_cannot_be_spent_again() {
        let db = LedgerDb::open_temporary().unwrap();
        let alice = KeySet::generate();
        let bob = KeySet::generate();
        let carol = KeySet::generate();
        let (genesis, init) = genesis_with_token(&db, &alice, 100);

        let first = spend(&db, &alice, &init, &bob, 10);
        let block1 = Block::new(&genesis, vec![Transaction::CustomToken(first)], "p".into());
        commit(&db, &block1).unwrap();

        let second = spend(&db, &alice, &init, &carol, 10);
        let block2 = Block::new(&block1, vec![Transaction::CustomToken(second)], "p".into());
        let err = commit(&db, &block2).unwrap_err();
        assert!(matches!(err, StoreError::TokenOutputUnavailable { .. }));

        // Nothing from the rejected block landed.
        assert_eq!(db.best_height(SHARD).unwrap(), Some(1));
        assert!(db.token_holders(init.property_id()).unwrap().get(&carol.payment_address().spend_key_base58()).is_none());
    }

    #[test]
    fn failed_apply_writes_nothing() {
        let db = LedgerDb::open_temporary().unwrap();
        let sn = CompressedRistretto([5; 32]);
        db.store_serial_numbers(&NATIVE_TOKEN_ID, SHARD, &[sn]).unwrap();

        let mut view = TxViewPoint {
            shard_id: SHARD,
            height: 0,
            ..TxViewPoint::default()
        };
        view.native.commitments.insert([1; 32], vec![coin(1)]);
        view.native.serial_numbers.push(sn);
        let block = Block::genesis(SHARD, vec![]);

        assert!(db.apply_view(&block, &view).is_err());
        assert_eq!(db.commitment_count(&NATIVE_TOKEN_ID, SHARD).unwrap(), 0);
        assert_eq!(db.best_height(SHARD).unwrap(), None);
    }

    #[test]
    fn rewarded_outputs_leave_later_snapshots() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let (_, init) = genesis_with_token(&db, &owner, 5);
        db.mark_token_output_rewarded(init.property_id(), &owner.payment_address(), &init.hash(), 0)
            .unwrap();
        let vouts = db.unspent_token_vouts(init.property_id(), &owner.payment_address()).unwrap();
        assert!(vouts[0].rewarded);
        // Still a holder, just no longer reward-eligible.
        assert_eq!(db.token_holders(init.property_id()).unwrap().len(), 1);
        let history = db.token_history(init.property_id()).unwrap();
        assert!(holder_balances(init.property_id(), &history, true).unwrap().is_empty());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            db.store_commitments(&NATIVE_TOKEN_ID, SHARD, &[coin(1)]).unwrap();
            db.flush().unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        assert_eq!(db.commitment_count(&NATIVE_TOKEN_ID, SHARD).unwrap(), 1);
    }
}
