//! Key encoding for the `ledger` tree.
//!
//! Binary records start with a one-byte tag and are scoped by
//! `(token ID, shard)` wherever the data is per token:
//!
//! | Tag    | Key after the tag                     | Value                   |
//! |--------|---------------------------------------|-------------------------|
//! | `0x01` | token, shard, serial number           | empty                   |
//! | `0x02` | token, shard, SND                     | empty                   |
//! | `0x03` | token, shard, commitment              | index (8B BE)           |
//! | `0x04` | token, shard, index (8B BE)           | `bincode(Coin)`         |
//! | `0x05` | token, shard                          | count (8B BE)           |
//! | `0x06` | token, shard, owner key, index        | `bincode(Coin)`         |
//! | `0x07` | property ID                           | `bincode(TokenRecord)`  |
//! | `0x08` | property ID, height (8B BE), position | tx hash                 |
//! | `0x09` | tx hash                               | `bincode(Transaction)`  |
//! | `0x0A` | shard                                 | best height (8B BE)     |
//! | `0x0B` | shard, height (8B BE)                 | `bincode(Block)`        |
//! | `0x0C` | property ID, height (8B BE)           | `bincode(snapshot)`     |
//!
//! Custom-token history uses the human-readable layout instead:
//!
//! ```text
//! token-paymentaddress-[-]-{property hex}-[-]-{address b58}-[-]-{utxo hex}-[-]-{vout byte}
//!     => {amount}-[-]-{spent|unspent}-[-]-{rewarded|unrewarded}
//! ```

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;

use super::store::StoreError;
use crate::config::{ShardId, KEY_DELIMITER, REWARDED, SPENT, TOKEN_HISTORY_PREFIX, UNREWARDED, UNSPENT};
use crate::crypto::hash::Hash;
use crate::crypto::keys::PaymentAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Tag {
    SerialNumber = 0x01,
    Snd = 0x02,
    CommitmentIndex = 0x03,
    Coin = 0x04,
    CommitmentCount = 0x05,
    OutputCoin = 0x06,
    Token = 0x07,
    TokenTx = 0x08,
    Transaction = 0x09,
    BestHeight = 0x0A,
    Block = 0x0B,
    RewardSnapshot = 0x0C,
}

fn scoped(tag: Tag, token_id: &Hash, shard_id: ShardId, extra: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32 + 1 + extra);
    key.push(tag as u8);
    key.extend_from_slice(token_id.as_bytes());
    key.push(shard_id);
    key
}

pub(crate) fn serial_number(token_id: &Hash, shard_id: ShardId, sn: &CompressedRistretto) -> Vec<u8> {
    let mut key = scoped(Tag::SerialNumber, token_id, shard_id, 32);
    key.extend_from_slice(sn.as_bytes());
    key
}

pub(crate) fn snd(token_id: &Hash, shard_id: ShardId, snd: &Scalar) -> Vec<u8> {
    let mut key = scoped(Tag::Snd, token_id, shard_id, 32);
    key.extend_from_slice(snd.as_bytes());
    key
}

pub(crate) fn commitment_index(token_id: &Hash, shard_id: ShardId, commitment: &CompressedRistretto) -> Vec<u8> {
    let mut key = scoped(Tag::CommitmentIndex, token_id, shard_id, 32);
    key.extend_from_slice(commitment.as_bytes());
    key
}

pub(crate) fn coin(token_id: &Hash, shard_id: ShardId, index: u64) -> Vec<u8> {
    let mut key = scoped(Tag::Coin, token_id, shard_id, 8);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

pub(crate) fn commitment_count(token_id: &Hash, shard_id: ShardId) -> Vec<u8> {
    scoped(Tag::CommitmentCount, token_id, shard_id, 0)
}

pub(crate) fn output_coins_of(token_id: &Hash, shard_id: ShardId, owner: &CompressedRistretto) -> Vec<u8> {
    let mut key = scoped(Tag::OutputCoin, token_id, shard_id, 40);
    key.extend_from_slice(owner.as_bytes());
    key
}

pub(crate) fn output_coin(token_id: &Hash, shard_id: ShardId, owner: &CompressedRistretto, index: u64) -> Vec<u8> {
    let mut key = output_coins_of(token_id, shard_id, owner);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

pub(crate) fn token(property_id: &Hash) -> Vec<u8> {
    let mut key = vec![Tag::Token as u8];
    key.extend_from_slice(property_id.as_bytes());
    key
}

pub(crate) fn token_txs_of(property_id: &Hash) -> Vec<u8> {
    let mut key = vec![Tag::TokenTx as u8];
    key.extend_from_slice(property_id.as_bytes());
    key
}

pub(crate) fn token_tx(property_id: &Hash, height: u64, position: u32) -> Vec<u8> {
    let mut key = token_txs_of(property_id);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&position.to_be_bytes());
    key
}

pub(crate) fn transaction(hash: &Hash) -> Vec<u8> {
    let mut key = vec![Tag::Transaction as u8];
    key.extend_from_slice(hash.as_bytes());
    key
}

pub(crate) fn best_height(shard_id: ShardId) -> Vec<u8> {
    vec![Tag::BestHeight as u8, shard_id]
}

pub(crate) fn block(shard_id: ShardId, height: u64) -> Vec<u8> {
    let mut key = vec![Tag::Block as u8, shard_id];
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub(crate) fn reward_snapshot(property_id: &Hash, height: u64) -> Vec<u8> {
    let mut key = vec![Tag::RewardSnapshot as u8];
    key.extend_from_slice(property_id.as_bytes());
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("expected 8-byte integer, found {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// Token history
// ---------------------------------------------------------------------------

/// `token-paymentaddress-[-]-{property}`, the prefix of one token's history.
pub fn token_history_prefix(property_id: &Hash) -> Vec<u8> {
    format!("{TOKEN_HISTORY_PREFIX}{KEY_DELIMITER}{}", property_id.to_hex()).into_bytes()
}

/// History prefix of one holder of one token.
pub fn token_history_address_prefix(property_id: &Hash, address: &PaymentAddress) -> Vec<u8> {
    let mut key = token_history_prefix(property_id);
    key.extend_from_slice(KEY_DELIMITER.as_bytes());
    key.extend_from_slice(address.spend_key_base58().as_bytes());
    key.extend_from_slice(KEY_DELIMITER.as_bytes());
    key
}

/// Full history key of output `vout_index` of `utxo`.
pub fn token_history_key(property_id: &Hash, address: &PaymentAddress, utxo: &Hash, vout_index: u8) -> Vec<u8> {
    let mut key = token_history_address_prefix(property_id, address);
    key.extend_from_slice(utxo.to_hex().as_bytes());
    key.extend_from_slice(KEY_DELIMITER.as_bytes());
    key.push(vout_index);
    key
}

/// The parts of a history key after the property ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHistoryKey {
    /// Base58 spend key of the holder.
    pub address: String,
    pub utxo: Hash,
    pub vout_index: u8,
}

impl TokenHistoryKey {
    /// Parse a key found under [`token_history_prefix`] of `property_id`.
    pub fn parse(property_id: &Hash, key: &[u8]) -> Result<Self, StoreError> {
        let corrupt = || StoreError::Corrupt(format!("bad token history key {}", String::from_utf8_lossy(key)));
        let prefix = token_history_prefix(property_id);
        let rest = key.strip_prefix(prefix.as_slice()).ok_or_else(corrupt)?;
        let rest = rest.strip_prefix(KEY_DELIMITER.as_bytes()).ok_or_else(corrupt)?;

        // The vout index is a raw byte and may itself look like a delimiter,
        // so peel it off the end first.
        let (&vout_index, rest) = rest.split_last().ok_or_else(corrupt)?;
        let rest = rest.strip_suffix(KEY_DELIMITER.as_bytes()).ok_or_else(corrupt)?;
        let text = std::str::from_utf8(rest).map_err(|_| corrupt())?;
        let (address, utxo) = text.split_once(KEY_DELIMITER).ok_or_else(corrupt)?;
        let utxo = Hash::from_hex(utxo).map_err(|_| corrupt())?;
        Ok(Self {
            address: address.to_string(),
            utxo,
            vout_index,
        })
    }
}

/// `{amount}-[-]-{spent|unspent}-[-]-{rewarded|unrewarded}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHistoryValue {
    pub amount: u64,
    pub spent: bool,
    pub rewarded: bool,
}

impl TokenHistoryValue {
    pub fn unspent(amount: u64) -> Self {
        Self {
            amount,
            spent: false,
            rewarded: false,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let spent = if self.spent { SPENT } else { UNSPENT };
        let rewarded = if self.rewarded { REWARDED } else { UNREWARDED };
        format!("{}{KEY_DELIMITER}{spent}{KEY_DELIMITER}{rewarded}", self.amount).into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let corrupt = || StoreError::Corrupt(format!("bad token history value {}", String::from_utf8_lossy(bytes)));
        let text = std::str::from_utf8(bytes).map_err(|_| corrupt())?;
        let mut parts = text.split(KEY_DELIMITER);
        let (Some(amount), Some(spent), Some(rewarded), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(corrupt());
        };
        let amount = amount.parse().map_err(|_| corrupt())?;
        let spent = match spent {
            SPENT => true,
            UNSPENT => false,
            _ => return Err(corrupt()),
        };
        let rewarded = match rewarded {
            REWARDED => true,
            UNREWARDED => false,
            _ => return Err(corrupt()),
        };
        Ok(Self {
            amount,
            spent,
            rewarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeySet;

    #[test]
    fn history_key_layout() {
        let property = Hash::new([0xab; 32]);
        let utxo = Hash::new([0x01; 32]);
        let address = KeySet::from_seed(&[5; 32]).payment_address();
        let key = token_history_key(&property, &address, &utxo, 3);

        let expected_head = format!(
            "token-paymentaddress-[-]-{}-[-]-{}-[-]-{}-[-]-",
            property.to_hex(),
            address.spend_key_base58(),
            utxo.to_hex()
        );
        assert!(key.starts_with(expected_head.as_bytes()));
        assert_eq!(*key.last().unwrap(), 3);
    }

    #[test]
    fn history_key_parses_back() {
        let property = Hash::new([0x10; 32]);
        let utxo = Hash::new([0x20; 32]);
        let address = KeySet::from_seed(&[6; 32]).payment_address();
        // b'-' as the index byte must not confuse the parser.
        let key = token_history_key(&property, &address, &utxo, b'-');
        let parsed = TokenHistoryKey::parse(&property, &key).unwrap();
        assert_eq!(parsed.address, address.spend_key_base58());
        assert_eq!(parsed.utxo, utxo);
        assert_eq!(parsed.vout_index, b'-');
    }

    #[test]
    fn history_value_encoding() {
        let value = TokenHistoryValue::unspent(42);
        assert_eq!(value.encode(), b"42-[-]-unspent-[-]-unrewarded".to_vec());
        let spent = TokenHistoryValue {
            spent: true,
            rewarded: true,
            ..value
        };
        assert_eq!(TokenHistoryValue::decode(&spent.encode()).unwrap(), spent);
        assert!(TokenHistoryValue::decode(b"42-[-]-maybe-[-]-unrewarded").is_err());
        assert!(TokenHistoryValue::decode(b"42-[-]-spent").is_err());
    }

    #[test]
    fn scoped_keys_differ_by_shard_and_token() {
        let sn = CompressedRistretto([7; 32]);
        let a = serial_number(&Hash::new([1; 32]), 0, &sn);
        let b = serial_number(&Hash::new([1; 32]), 1, &sn);
        let c = serial_number(&Hash::new([2; 32]), 0, &sn);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
