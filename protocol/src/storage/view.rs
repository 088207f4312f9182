//! Per-block aggregation of everything a block writes.
//!
//! [`TxViewPoint::from_block`] only reads the block. It gathers serial
//! numbers, output coins and SNDs per token, the custom-token transactions
//! and the tokens the block creates, and rejects a block whose transactions
//! spend the same thing twice. [`super::LedgerDb::apply_view`] then writes
//! the whole view in one batch.

use std::collections::{BTreeMap, HashSet};

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::block::Block;
use crate::config::{ShardId, NATIVE_TOKEN_ID};
use crate::crypto::hash::Hash;
use crate::privacy::Coin;
use crate::transaction::{
    CustomTokenTx, DoubleSpendLayer, PrivacyTokenTx, PrivacyTx, TokenTxKind, Transaction, TxError,
};

/// What the ledger remembers about a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub property_id: Hash,
    pub name: String,
    pub symbol: String,
    /// Initial supply.
    pub amount: u64,
    pub mintable: bool,
    /// Coins live in the commitment ledger rather than in vin/vout history.
    pub privacy: bool,
    pub shard_id: ShardId,
    pub init_tx: Hash,
}

impl From<&CustomTokenTx> for TokenRecord {
    fn from(tx: &CustomTokenTx) -> Self {
        let data = tx.token_data();
        Self {
            property_id: data.property_id,
            name: data.property_name.clone(),
            symbol: data.property_symbol.clone(),
            amount: data.amount,
            mintable: data.mintable,
            privacy: false,
            shard_id: tx.shard_id(),
            init_tx: tx.hash(),
        }
    }
}

impl From<&PrivacyTokenTx> for TokenRecord {
    fn from(tx: &PrivacyTokenTx) -> Self {
        let data = &tx.token_data;
        Self {
            property_id: data.property_id,
            name: data.property_name.clone(),
            symbol: data.property_symbol.clone(),
            amount: data.amount,
            mintable: data.mintable,
            privacy: true,
            shard_id: tx.shard_id(),
            init_tx: tx.hash(),
        }
    }
}

/// The commitment-ledger writes of one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinView {
    pub serial_numbers: Vec<CompressedRistretto>,
    /// New coins grouped by owner (one-time public key bytes). Indexes are
    /// assigned in key order at persist time.
    pub commitments: BTreeMap<[u8; 32], Vec<Coin>>,
    pub snds: Vec<Scalar>,
}

impl CoinView {
    fn absorb(&mut self, tx: &PrivacyTx) {
        self.serial_numbers.extend_from_slice(tx.serial_numbers());
        for coin in tx.output_coins() {
            self.commitments.entry(coin.public_key.to_bytes()).or_default().push(*coin);
            self.snds.push(coin.snd);
        }
    }

    pub fn coin_count(&self) -> usize {
        self.commitments.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.serial_numbers.is_empty() && self.commitments.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TxViewPoint {
    pub shard_id: ShardId,
    pub height: u64,
    /// Native coins, including every fee transaction.
    pub native: CoinView,
    /// Privacy-token coins keyed by property ID.
    pub privacy_token_views: BTreeMap<Hash, CoinView>,
    /// Custom-token transactions with their position in the block.
    pub custom_token_txs: Vec<(u32, CustomTokenTx)>,
    /// Privacy-token transactions with their position in the block.
    pub privacy_token_txs: Vec<(u32, PrivacyTokenTx)>,
    /// Tokens whose Init appears in this block. At most one Init per property ID.
    pub new_tokens: Vec<TokenRecord>,
}

impl TxViewPoint {
    pub fn from_block(block: &Block) -> Result<Self, TxError> {
        let mut view = Self {
            shard_id: block.shard_id(),
            height: block.height(),
            ..Self::default()
        };
        let mut seen_serials: HashSet<(Hash, [u8; 32])> = HashSet::new();
        let mut seen_vouts: HashSet<(Hash, u32)> = HashSet::new();
        let mut seen_snds: HashSet<(Hash, [u8; 32])> = HashSet::new();
        let mut seen_tokens: HashSet<Hash> = HashSet::new();

        for (position, tx) in block.transactions.iter().enumerate() {
            let position = position as u32;
            for (token_id, sn) in tx.serial_numbers() {
                if !seen_serials.insert((token_id, sn.to_bytes())) {
                    return Err(TxError::DoubleSpendDetected {
                        layer: DoubleSpendLayer::Block,
                        detail: format!(
                            "serial number {} of token {token_id} spent twice in block {}",
                            hex::encode(sn.as_bytes()),
                            view.height
                        ),
                    });
                }
            }
            for privacy_tx in tx.privacy_txs() {
                for (output, coin) in privacy_tx.output_coins().iter().enumerate() {
                    if !seen_snds.insert((privacy_tx.token_id, coin.snd.to_bytes())) {
                        return Err(TxError::SndAlreadyExists {
                            output,
                            shard_id: view.shard_id,
                        });
                    }
                }
                view.coin_view_mut(privacy_tx.token_id).absorb(privacy_tx);
            }

            match tx {
                Transaction::Normal(_) => {}
                Transaction::CustomToken(token_tx) => {
                    for vin in &token_tx.token_data().vins {
                        if !seen_vouts.insert((vin.tx_custom_token_id, vin.vout_index)) {
                            return Err(TxError::DoubleSpendDetected {
                                layer: DoubleSpendLayer::Block,
                                detail: format!(
                                    "vout {}:{} spent twice in block {}",
                                    vin.tx_custom_token_id, vin.vout_index, view.height
                                ),
                            });
                        }
                    }
                    if token_tx.kind() == TokenTxKind::Init {
                        claim_token(&mut seen_tokens, token_tx.property_id())?;
                        view.new_tokens.push(TokenRecord::from(token_tx));
                    }
                    view.custom_token_txs.push((position, token_tx.clone()));
                }
                Transaction::PrivacyToken(token_tx) => {
                    if token_tx.kind() == TokenTxKind::Init {
                        claim_token(&mut seen_tokens, token_tx.property_id())?;
                        view.new_tokens.push(TokenRecord::from(token_tx));
                    }
                    view.privacy_token_txs.push((position, token_tx.clone()));
                }
            }
        }
        Ok(view)
    }

    fn coin_view_mut(&mut self, token_id: Hash) -> &mut CoinView {
        if token_id == NATIVE_TOKEN_ID {
            &mut self.native
        } else {
            self.privacy_token_views.entry(token_id).or_default()
        }
    }

    /// Every coin view with its token ID, native first.
    pub fn coin_views(&self) -> impl Iterator<Item = (Hash, &CoinView)> {
        std::iter::once((NATIVE_TOKEN_ID, &self.native))
            .chain(self.privacy_token_views.iter().map(|(id, view)| (*id, view)))
    }

    /// Property IDs touched by custom-token transactions in this block.
    pub fn custom_token_properties(&self) -> Vec<Hash> {
        let mut ids: Vec<Hash> = self.custom_token_txs.iter().map(|(_, tx)| *tx.property_id()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A block may create each property ID once, whatever the token kind.
fn claim_token(seen: &mut HashSet<Hash>, property_id: &Hash) -> Result<(), TxError> {
    if seen.insert(*property_id) {
        Ok(())
    } else {
        Err(TxError::TokenAlreadyExists(*property_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TX_VERSION;
    use crate::crypto::keys::KeySet;
    use crate::privacy::PaymentInfo;
    use crate::transaction::{TokenIdentity, TxTokenData, TxTokenVin, TxTokenVout};
    use rand::rngs::OsRng;

    const SHARD: ShardId = 0;

    fn mint(owner: &KeySet, amounts: &[u64], token_id: Hash) -> PrivacyTx {
        let payments: Vec<PaymentInfo> = amounts
            .iter()
            .map(|&amount| PaymentInfo {
                address: owner.payment_address(),
                amount,
            })
            .collect();
        PrivacyTx::mint(&payments, token_id, SHARD, 0, &mut OsRng).unwrap().0
    }

    fn with_serials(sns: &[[u8; 32]]) -> PrivacyTx {
        // Only the serial numbers matter to the view; they live in the proof.
        let owner = KeySet::generate();
        let mut tx = mint(&owner, &[1], NATIVE_TOKEN_ID);
        if let Some(proof) = tx.proof.as_mut() {
            proof.serial_numbers = sns.iter().map(|b| CompressedRistretto(*b)).collect();
        }
        tx
    }

    fn unsigned_fee() -> PrivacyTx {
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

    #[test]
    fn groups_coins_per_token_and_owner() {
        let alice = KeySet::generate();
        let token = Hash::new([9; 32]);
        let block = Block::genesis(
            SHARD,
            vec![
                Transaction::Normal(mint(&alice, &[5, 6], NATIVE_TOKEN_ID)),
                Transaction::Normal(mint(&alice, &[7], token)),
            ],
        );
        let view = TxViewPoint::from_block(&block).unwrap();
        assert_eq!(view.native.coin_count(), 2);
        assert_eq!(view.native.snds.len(), 2);
        assert_eq!(view.privacy_token_views[&token].coin_count(), 1);
        assert_eq!(view.coin_views().count(), 2);
    }

    #[test]
    fn duplicate_serial_within_block_rejected() {
        let block = Block::genesis(
            SHARD,
            vec![
                Transaction::Normal(with_serials(&[[1; 32]])),
                Transaction::Normal(with_serials(&[[1; 32]])),
            ],
        );
        assert!(matches!(
            TxViewPoint::from_block(&block),
            Err(TxError::DoubleSpendDetected {
                layer: DoubleSpendLayer::Block,
                ..
            })
        ));
    }

    #[test]
    fn same_serial_of_different_tokens_allowed() {
        let mut other = with_serials(&[[1; 32]]);
        other.token_id = Hash::new([3; 32]);
        let block = Block::genesis(
            SHARD,
            vec![Transaction::Normal(with_serials(&[[1; 32]])), Transaction::Normal(other)],
        );
        TxViewPoint::from_block(&block).unwrap();
    }

    #[test]
    fn custom_token_vin_spent_twice_in_block_rejected() {
        let owner = KeySet::generate();
        let vout = TxTokenVout::new(owner.payment_address(), 10);
        let source = Hash::new([4; 32]);
        let data = |value| TxTokenData {
            property_id: Hash::new([8; 32]),
            property_name: "A".into(),
            property_symbol: "A".into(),
            kind: TokenTxKind::Transfer,
            mintable: false,
            amount: 0,
            vins: vec![TxTokenVin::sign(&owner, source, 0, &vout)],
            vouts: vec![TxTokenVout::new(KeySet::generate().payment_address(), value)],
        };
        let a = CustomTokenTx::assemble(unsigned_fee(), data(10));
        let b = CustomTokenTx::assemble(unsigned_fee(), data(9));
        let block = Block::genesis(SHARD, vec![Transaction::CustomToken(a), Transaction::CustomToken(b)]);
        assert!(matches!(
            TxViewPoint::from_block(&block),
            Err(TxError::DoubleSpendDetected {
                layer: DoubleSpendLayer::Block,
                ..
            })
        ));
    }

    #[test]
    fn repeated_output_snd_within_block_rejected() {
        let alice = KeySet::generate();
        let tx = mint(&alice, &[5], NATIVE_TOKEN_ID);
        let block = Block::genesis(SHARD, vec![Transaction::Normal(tx.clone()), Transaction::Normal(tx)]);
        assert!(matches!(
            TxViewPoint::from_block(&block),
            Err(TxError::SndAlreadyExists { output: 0, shard_id: SHARD })
        ));
    }

    fn alpha_init(owner: &KeySet, db: &crate::storage::LedgerDb) -> CustomTokenTx {
        let identity = TokenIdentity {
            name: "Alpha".into(),
            symbol: "ALP".into(),
        };
        CustomTokenTx::create_init(unsigned_fee(), identity, 100, owner.payment_address(), None, db).unwrap()
    }

    #[test]
    fn init_registers_token() {
        let db = crate::storage::LedgerDb::open_temporary().unwrap();
        let init = alpha_init(&KeySet::generate(), &db);
        let block = Block::genesis(SHARD, vec![Transaction::CustomToken(init.clone())]);
        let view = TxViewPoint::from_block(&block).unwrap();
        assert_eq!(view.new_tokens.len(), 1);
        assert_eq!(view.new_tokens[0].property_id, *init.property_id());
        assert!(!view.new_tokens[0].privacy);
        assert_eq!(view.custom_token_txs.len(), 1);
        assert_eq!(view.custom_token_properties(), vec![*init.property_id()]);
    }

    #[test]
    fn second_init_of_same_property_rejected() {
        let db = crate::storage::LedgerDb::open_temporary().unwrap();
        let init = alpha_init(&KeySet::generate(), &db);
        let mut data = init.token_data().clone();
        data.vouts[0] = TxTokenVout::new(KeySet::generate().payment_address(), 100);
        let rival = CustomTokenTx::assemble(unsigned_fee(), data);
        let block = Block::genesis(SHARD, vec![Transaction::CustomToken(init.clone()), Transaction::CustomToken(rival)]);
        assert!(matches!(
            TxViewPoint::from_block(&block),
            Err(TxError::TokenAlreadyExists(id)) if id == *init.property_id()
        ));
    }
}
