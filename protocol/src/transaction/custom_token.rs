//! # Custom Token Transactions
//!
//! Non-native tokens kept in plain vin/vout form. The native fee travels in
//! an ordinary [`PrivacyTx`]; the token movement sits next to it in
//! [`TxTokenData`].
//!
//! - **Init** mints the whole supply into one vout.
//! - **Transfer** spends earlier vouts by `(tx hash, vout index)`. Each vin
//!   carries the owner's Ed25519 signature over the referenced vout's hash.
//! - **CrossShard** carries vouts already checked on the origin shard.
//!
//! The referenced transactions are resolved up front into a [`UtxoSet`] and
//! passed into validation. A [`CustomTokenTx`] is immutable once built, so
//! its hash is computed exactly once.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{DoubleSpendLayer, TxError};
use super::privacy_tx::PrivacyTx;
use crate::config::{ShardId, MAX_TOKEN_NAME_LENGTH, MAX_TOKEN_VOUTS, NATIVE_TOKEN_ID};
use crate::crypto::hash::{blake3_hash_multi, sha256_array, Hash};
use crate::crypto::keys::{AuthSignature, KeySet, PaymentAddress};
use crate::storage::{ChainRetriever, CommitmentStore};

// ---------------------------------------------------------------------------
// Token data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenTxKind {
    Init,
    Transfer,
    CrossShard,
}

impl fmt::Display for TokenTxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Transfer => write!(f, "Transfer"),
            Self::CrossShard => write!(f, "CrossShard"),
        }
    }
}

impl TokenTxKind {
    fn tag(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Transfer => 1,
            Self::CrossShard => 2,
        }
    }
}

/// A reference to an earlier vout, authorized by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTokenVin {
    pub tx_custom_token_id: Hash,
    pub vout_index: u32,
    pub payment_address: PaymentAddress,
    pub signature: AuthSignature,
}

impl TxTokenVin {
    /// Spend `vout` (output `vout_index` of transaction `tx_id`) with `owner`.
    pub fn sign(owner: &KeySet, tx_id: Hash, vout_index: u32, vout: &TxTokenVout) -> Self {
        Self {
            tx_custom_token_id: tx_id,
            vout_index,
            payment_address: owner.payment_address(),
            signature: owner.sign(vout.hash().as_bytes()),
        }
    }

    fn outpoint(&self) -> (Hash, u32) {
        (self.tx_custom_token_id, self.vout_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTokenVout {
    pub payment_address: PaymentAddress,
    pub value: u64,
}

impl TxTokenVout {
    pub fn new(payment_address: PaymentAddress, value: u64) -> Self {
        Self {
            payment_address,
            value,
        }
    }

    /// The message a vin signs to spend this vout.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(&self.payment_address.to_bytes());
        buf.extend_from_slice(&self.value.to_le_bytes());
        Hash::new(sha256_array(&buf))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTokenData {
    pub property_id: Hash,
    pub property_name: String,
    pub property_symbol: String,
    pub kind: TokenTxKind,
    pub mintable: bool,
    /// Total supply for Init. Informational otherwise.
    pub amount: u64,
    pub vins: Vec<TxTokenVin>,
    pub vouts: Vec<TxTokenVout>,
}

impl TxTokenData {
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.property_id.as_bytes());
        write_str(&mut buf, &self.property_name);
        write_str(&mut buf, &self.property_symbol);
        buf.push(self.kind.tag());
        buf.push(self.mintable as u8);
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(&(self.vins.len() as u32).to_le_bytes());
        for vin in &self.vins {
            buf.extend_from_slice(vin.tx_custom_token_id.as_bytes());
            buf.extend_from_slice(&vin.vout_index.to_le_bytes());
            buf.extend_from_slice(&vin.payment_address.to_bytes());
            buf.extend_from_slice(vin.signature.as_bytes());
        }
        buf.extend_from_slice(&(self.vouts.len() as u32).to_le_bytes());
        for vout in &self.vouts {
            buf.extend_from_slice(vout.hash().as_bytes());
        }
        Hash::new(sha256_array(&buf))
    }

    /// The ID [`derive_property_id`] gives this data with its own
    /// property ID zeroed.
    fn derived_property_id(&self, shard_id: ShardId) -> Hash {
        let unnamed = TxTokenData {
            property_id: Hash::zero(),
            ..self.clone()
        };
        derive_property_id(&unnamed.hash(), shard_id)
    }

    fn vout_total(&self) -> Result<u64, TxError> {
        self.vouts
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(v.value))
            .ok_or_else(|| TxError::invalid("vout values overflow"))
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Property ID of a non-mintable token: its Init data plus the shard.
pub fn derive_property_id(token_data_hash: &Hash, shard_id: ShardId) -> Hash {
    let mut buf = [0u8; 33];
    buf[..32].copy_from_slice(token_data_hash.as_bytes());
    buf[32] = shard_id;
    Hash::new(sha256_array(&buf))
}

// ---------------------------------------------------------------------------
// CustomTokenTx
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CustomTokenTxParts")]
pub struct CustomTokenTx {
    fee_tx: PrivacyTx,
    token_data: TxTokenData,
    #[serde(skip_serializing)]
    hash: Hash,
}

#[derive(Deserialize)]
struct CustomTokenTxParts {
    fee_tx: PrivacyTx,
    token_data: TxTokenData,
}

impl From<CustomTokenTxParts> for CustomTokenTx {
    fn from(parts: CustomTokenTxParts) -> Self {
        Self::assemble(parts.fee_tx, parts.token_data)
    }
}

/// Names shared by every constructor.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub name: String,
    pub symbol: String,
}

impl CustomTokenTx {
    pub(crate) fn assemble(fee_tx: PrivacyTx, token_data: TxTokenData) -> Self {
        let hash = Hash::new(blake3_hash_multi(&[
            fee_tx.hash().as_bytes(),
            token_data.hash().as_bytes(),
        ]));
        Self {
            fee_tx,
            token_data,
            hash,
        }
    }

    /// Create a token with its whole supply paid to `receiver`.
    ///
    /// `mintable_id` is the caller-chosen property ID of a mintable token.
    /// Without one the ID is derived from the token data and the shard.
    pub fn create_init<S: CommitmentStore + ?Sized>(
        fee_tx: PrivacyTx,
        identity: TokenIdentity,
        amount: u64,
        receiver: PaymentAddress,
        mintable_id: Option<Hash>,
        store: &S,
    ) -> Result<Self, TxError> {
        let mut token_data = TxTokenData {
            property_id: Hash::zero(),
            property_name: identity.name,
            property_symbol: identity.symbol,
            kind: TokenTxKind::Init,
            mintable: mintable_id.is_some(),
            amount,
            vins: Vec::new(),
            vouts: vec![TxTokenVout::new(receiver, amount)],
        };
        token_data.property_id = match mintable_id {
            Some(id) => id,
            None => token_data.derived_property_id(fee_tx.shard_id),
        };
        if store.token_exists(&token_data.property_id)? {
            return Err(TxError::TokenAlreadyExists(token_data.property_id));
        }
        Ok(Self::assemble(fee_tx, token_data))
    }

    /// Spend `vins` and pay `receivers`; whatever is left over goes back to
    /// the first vin's address.
    pub fn create_transfer<S: CommitmentStore + ?Sized>(
        fee_tx: PrivacyTx,
        identity: TokenIdentity,
        property_id: Hash,
        vins: Vec<TxTokenVin>,
        utxos: &UtxoSet,
        receivers: Vec<TxTokenVout>,
        store: &S,
    ) -> Result<Self, TxError> {
        if !store.token_exists(&property_id)? {
            return Err(TxError::TokenNotFound(property_id));
        }
        let first = vins
            .first()
            .ok_or_else(|| TxError::invalid("a transfer needs at least one vin"))?;
        let change_address = first.payment_address;

        let mut available = 0u64;
        for (index, vin) in vins.iter().enumerate() {
            let vout = utxos.vout(&property_id, index, vin)?;
            available = available
                .checked_add(vout.value)
                .ok_or_else(|| TxError::invalid("vin values overflow"))?;
        }
        let required = receivers
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(v.value))
            .ok_or_else(|| TxError::invalid("vout values overflow"))?;
        let change = available
            .checked_sub(required)
            .ok_or(TxError::InsufficientInput {
                available,
                required,
            })?;

        let mut vouts = receivers;
        if change > 0 {
            vouts.push(TxTokenVout::new(change_address, change));
        }
        let token_data = TxTokenData {
            property_id,
            property_name: identity.name,
            property_symbol: identity.symbol,
            kind: TokenTxKind::Transfer,
            mintable: false,
            amount: required,
            vins,
            vouts,
        };
        Ok(Self::assemble(fee_tx, token_data))
    }

    /// Vouts arriving from another shard.
    pub fn create_cross_shard(
        fee_tx: PrivacyTx,
        identity: TokenIdentity,
        property_id: Hash,
        vouts: Vec<TxTokenVout>,
    ) -> Self {
        let amount = vouts.iter().map(|v| v.value).fold(0u64, u64::saturating_add);
        let token_data = TxTokenData {
            property_id,
            property_name: identity.name,
            property_symbol: identity.symbol,
            kind: TokenTxKind::CrossShard,
            mintable: false,
            amount,
            vins: Vec::new(),
            vouts,
        };
        Self::assemble(fee_tx, token_data)
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn fee_tx(&self) -> &PrivacyTx {
        &self.fee_tx
    }

    pub fn token_data(&self) -> &TxTokenData {
        &self.token_data
    }

    pub fn property_id(&self) -> &Hash {
        &self.token_data.property_id
    }

    pub fn kind(&self) -> TokenTxKind {
        self.token_data.kind
    }

    pub fn shard_id(&self) -> ShardId {
        self.fee_tx.shard_id
    }

    pub fn size(&self) -> usize {
        let vins = self.token_data.vins.len() * (32 + 4 + 64 + 64);
        let vouts = self.token_data.vouts.len() * (64 + 8);
        self.fee_tx.size()
            + self.token_data.property_name.len()
            + self.token_data.property_symbol.len()
            + 32
            + 4
            + vins
            + vouts
    }

    /// True if the two transactions spend a common vout.
    pub fn conflicts_with(&self, other: &CustomTokenTx) -> bool {
        self.token_data.vins.iter().any(|ours| {
            other
                .token_data
                .vins
                .iter()
                .any(|theirs| ours.outpoint() == theirs.outpoint())
        })
    }

    pub fn validate_sanity(&self) -> Result<(), TxError> {
        self.fee_tx.validate_sanity()?;
        if self.fee_tx.token_id != NATIVE_TOKEN_ID {
            return Err(TxError::invalid("fee must be paid in the native token"));
        }
        if self.fee_tx.is_mint() {
            return Err(TxError::invalid("fee transaction cannot mint"));
        }

        let data = &self.token_data;
        if data.property_name.len() > MAX_TOKEN_NAME_LENGTH
            || data.property_symbol.len() > MAX_TOKEN_NAME_LENGTH
        {
            return Err(TxError::invalid("token name or symbol too long"));
        }
        if data.vouts.is_empty() {
            return Err(TxError::invalid("token transaction without vouts"));
        }
        if data.vouts.len() > MAX_TOKEN_VOUTS {
            return Err(TxError::invalid(format!(
                "{} vouts exceed the limit of {MAX_TOKEN_VOUTS}",
                data.vouts.len()
            )));
        }
        if let Some(index) = data.vouts.iter().position(|v| v.value == 0) {
            return Err(TxError::invalid(format!("vout {index} carries no value")));
        }
        let mut outpoints = HashSet::with_capacity(data.vins.len());
        for (index, vin) in data.vins.iter().enumerate() {
            if !outpoints.insert(vin.outpoint()) {
                return Err(TxError::DoubleSpendDetected {
                    layer: DoubleSpendLayer::Pool,
                    detail: format!(
                        "vin {index} repeats vout {}:{} in {}",
                        vin.tx_custom_token_id, vin.vout_index, self.hash
                    ),
                });
            }
            if vin.tx_custom_token_id == Hash::zero() {
                return Err(TxError::invalid(format!("vin {index} references the zero hash")));
            }
            if vin.vout_index as usize >= MAX_TOKEN_VOUTS {
                return Err(TxError::invalid(format!("vin {index} references vout {}", vin.vout_index)));
            }
            if vin.signature.as_bytes().is_empty() {
                return Err(TxError::InvalidVinSignature { vin: index });
            }
        }
        data.vout_total()?;

        match data.kind {
            TokenTxKind::Init => {
                if !data.vins.is_empty() || data.vouts.len() != 1 {
                    return Err(TxError::invalid("Init takes no vins and exactly one vout"));
                }
                if data.vouts[0].value != data.amount {
                    return Err(TxError::invalid("Init vout differs from the declared amount"));
                }
                if !data.mintable {
                    let derived = data.derived_property_id(self.shard_id());
                    if derived != data.property_id {
                        return Err(TxError::invalid(format!(
                            "Init property ID {} is not the derived {derived}",
                            data.property_id
                        )));
                    }
                }
            }
            TokenTxKind::Transfer if data.vins.is_empty() => {
                return Err(TxError::invalid("Transfer without vins"));
            }
            TokenTxKind::CrossShard if !data.vins.is_empty() => {
                return Err(TxError::invalid("CrossShard carries vouts only"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Check every vin against the vout it spends, then the balance law.
    pub fn validate_transfer(&self, utxos: &UtxoSet) -> Result<(), TxError> {
        let mut inputs = 0u64;
        for (index, vin) in self.token_data.vins.iter().enumerate() {
            let vout = utxos.vout(self.property_id(), index, vin)?;
            if vin.payment_address != vout.payment_address
                || !vin
                    .payment_address
                    .verify(vout.hash().as_bytes(), &vin.signature)
            {
                return Err(TxError::InvalidVinSignature { vin: index });
            }
            inputs = inputs
                .checked_add(vout.value)
                .ok_or_else(|| TxError::invalid("vin values overflow"))?;
        }
        let outputs = self.token_data.vout_total()?;
        if inputs != outputs {
            return Err(TxError::BalanceMismatch {
                property_id: self.token_data.property_id,
                inputs,
                outputs,
            });
        }
        Ok(())
    }

    /// Pairwise vin check against the pending transactions of the pool.
    pub fn check_pool_double_spend<'a>(
        &self,
        pending: impl IntoIterator<Item = &'a CustomTokenTx>,
    ) -> Result<(), TxError> {
        for other in pending {
            if other.hash != self.hash && self.conflicts_with(other) {
                return Err(TxError::DoubleSpendDetected {
                    layer: DoubleSpendLayer::Pool,
                    detail: format!("{} spends a vout already claimed by pending {}", self.hash, other.hash),
                });
            }
        }
        Ok(())
    }

    /// Pairwise vin check against every settled transaction of the token.
    pub fn check_chain_double_spend<C: ChainRetriever + ?Sized>(
        &self,
        chain: &C,
    ) -> Result<(), TxError> {
        let history = chain.custom_token_txs(self.property_id())?;
        if history.is_empty() && self.kind() == TokenTxKind::Transfer {
            return Err(TxError::TokenNotFound(*self.property_id()));
        }
        for settled in &history {
            if settled.hash != self.hash && self.conflicts_with(settled) {
                return Err(TxError::DoubleSpendDetected {
                    layer: DoubleSpendLayer::Chain,
                    detail: format!("{} spends a vout already spent by {}", self.hash, settled.hash),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UtxoSet
// ---------------------------------------------------------------------------

/// The earlier token transactions a transfer spends from, keyed by hash.
#[derive(Debug, Clone, Default)]
pub struct UtxoSet {
    txs: HashMap<Hash, CustomTokenTx>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every vin of `tx` through `chain`. A vin may only name an
    /// earlier transaction of the same property ID.
    pub fn fetch<C: ChainRetriever + ?Sized>(tx: &CustomTokenTx, chain: &C) -> Result<Self, TxError> {
        let mut set = Self::new();
        for (index, vin) in tx.token_data.vins.iter().enumerate() {
            if set.txs.contains_key(&vin.tx_custom_token_id) {
                continue;
            }
            let unknown = TxError::UnknownUtxo {
                vin: index,
                tx_id: vin.tx_custom_token_id,
                vout_index: vin.vout_index,
            };
            match chain.transaction_by_hash(&vin.tx_custom_token_id)? {
                Some(super::Transaction::CustomToken(prior)) if prior.property_id() == tx.property_id() => {
                    set.insert(prior)
                }
                _ => return Err(unknown),
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, tx: CustomTokenTx) {
        self.txs.insert(tx.hash(), tx);
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    fn vout(&self, property_id: &Hash, index: usize, vin: &TxTokenVin) -> Result<&TxTokenVout, TxError> {
        self.txs
            .get(&vin.tx_custom_token_id)
            .filter(|tx| tx.property_id() == property_id)
            .and_then(|tx| tx.token_data.vouts.get(vin.vout_index as usize))
            .ok_or(TxError::UnknownUtxo {
                vin: index,
                tx_id: vin.tx_custom_token_id,
                vout_index: vin.vout_index,
            })
    }
}
