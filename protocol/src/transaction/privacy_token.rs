//! Privacy custom tokens: a token whose coins live in the commitment ledger
//! under their own property ID, so transfers get the same ring-signature
//! privacy as the native token.
//!
//! The native fee is paid by `fee_tx`. The token itself moves in `token_tx`,
//! a [`PrivacyTx`] whose token ID is the property ID. An Init's `token_tx`
//! is a mint of exactly the declared amount. A Transfer's `token_tx` is an
//! ordinary spend.

use serde::{Deserialize, Serialize};

use super::custom_token::{derive_property_id, TokenIdentity, TokenTxKind};
use super::error::TxError;
use super::privacy_tx::PrivacyTx;
use crate::config::{ShardId, MAX_TOKEN_NAME_LENGTH, NATIVE_TOKEN_ID};
use crate::crypto::hash::{blake3_hash_multi, sha256_array, Hash};
use crate::privacy::ProofFailure;
use crate::storage::CommitmentStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPrivacyTokenData {
    pub property_id: Hash,
    pub property_name: String,
    pub property_symbol: String,
    pub kind: TokenTxKind,
    pub mintable: bool,
    pub amount: u64,
    pub token_tx: PrivacyTx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyTokenTx {
    pub fee_tx: PrivacyTx,
    pub token_data: TxPrivacyTokenData,
}

fn metadata_hash(identity: &TokenIdentity, amount: u64) -> Hash {
    let mut buf = Vec::new();
    buf.extend_from_slice(identity.name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(identity.symbol.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&amount.to_le_bytes());
    Hash::new(sha256_array(&buf))
}

impl PrivacyTokenTx {
    /// The property ID an Init would get: `mintable_id` when given, else
    /// derived from the name, symbol, amount and shard.
    pub fn init_property_id(
        identity: &TokenIdentity,
        amount: u64,
        shard_id: ShardId,
        mintable_id: Option<Hash>,
    ) -> Hash {
        mintable_id.unwrap_or_else(|| derive_property_id(&metadata_hash(identity, amount), shard_id))
    }

    /// Wrap a mint of `amount` (built with [`Self::init_property_id`] as its
    /// token ID) into an Init.
    pub fn create_init<S: CommitmentStore + ?Sized>(
        fee_tx: PrivacyTx,
        identity: TokenIdentity,
        amount: u64,
        token_tx: PrivacyTx,
        mintable: bool,
        store: &S,
    ) -> Result<Self, TxError> {
        let property_id = token_tx.token_id;
        if store.token_exists(&property_id)? {
            return Err(TxError::TokenAlreadyExists(property_id));
        }
        let tx = Self {
            fee_tx,
            token_data: TxPrivacyTokenData {
                property_id,
                property_name: identity.name,
                property_symbol: identity.symbol,
                kind: TokenTxKind::Init,
                mintable,
                amount,
                token_tx,
            },
        };
        tx.check_mint_amount()?;
        tx.check_derived_id()?;
        Ok(tx)
    }

    /// Wrap a signed spend of the token into a Transfer.
    pub fn create_transfer<S: CommitmentStore + ?Sized>(
        fee_tx: PrivacyTx,
        identity: TokenIdentity,
        token_tx: PrivacyTx,
        store: &S,
    ) -> Result<Self, TxError> {
        let property_id = token_tx.token_id;
        if !store.token_exists(&property_id)? {
            return Err(TxError::TokenNotFound(property_id));
        }
        Ok(Self {
            fee_tx,
            token_data: TxPrivacyTokenData {
                property_id,
                property_name: identity.name,
                property_symbol: identity.symbol,
                kind: TokenTxKind::Transfer,
                mintable: false,
                amount: 0,
                token_tx,
            },
        })
    }

    pub fn hash(&self) -> Hash {
        Hash::new(blake3_hash_multi(&[
            self.fee_tx.hash().as_bytes(),
            self.token_data.token_tx.hash().as_bytes(),
            self.token_data.property_name.as_bytes(),
            self.token_data.property_symbol.as_bytes(),
            &[self.token_data.mintable as u8],
            &self.token_data.amount.to_le_bytes(),
        ]))
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
        self.fee_tx.size()
            + self.token_data.token_tx.size()
            + self.token_data.property_name.len()
            + self.token_data.property_symbol.len()
            + 32
            + 9
    }

    fn check_mint_amount(&self) -> Result<(), TxError> {
        let token_tx = &self.token_data.token_tx;
        let minted = token_tx.proof.as_ref().map_or(0, |p| p.revealed_value());
        if minted != self.token_data.amount {
            return Err(TxError::ProofVerificationFailed {
                tx_hash: token_tx.hash(),
                kind: ProofFailure::MintAmount {
                    minted,
                    declared: self.token_data.amount,
                },
            });
        }
        Ok(())
    }

    /// A non-mintable Init must carry the ID its metadata derives to.
    fn check_derived_id(&self) -> Result<(), TxError> {
        let data = &self.token_data;
        if data.mintable {
            return Ok(());
        }
        let identity = TokenIdentity {
            name: data.property_name.clone(),
            symbol: data.property_symbol.clone(),
        };
        let derived = Self::init_property_id(&identity, data.amount, self.shard_id(), None);
        if derived != data.property_id {
            return Err(TxError::invalid(format!(
                "Init property ID {} is not the derived {derived}",
                data.property_id
            )));
        }
        Ok(())
    }

    pub fn validate_sanity(&self) -> Result<(), TxError> {
        self.fee_tx.validate_sanity()?;
        self.token_data.token_tx.validate_sanity()?;

        let data = &self.token_data;
        if self.fee_tx.token_id != NATIVE_TOKEN_ID || self.fee_tx.is_mint() {
            return Err(TxError::invalid("fee must be a native spend"));
        }
        if data.token_tx.token_id != data.property_id || data.property_id == NATIVE_TOKEN_ID {
            return Err(TxError::invalid("token transaction is not denominated in the property ID"));
        }
        if data.token_tx.shard_id != self.fee_tx.shard_id {
            return Err(TxError::invalid("fee and token transactions on different shards"));
        }
        if data.property_name.len() > MAX_TOKEN_NAME_LENGTH
            || data.property_symbol.len() > MAX_TOKEN_NAME_LENGTH
        {
            return Err(TxError::invalid("token name or symbol too long"));
        }
        match data.kind {
            TokenTxKind::Init if !data.token_tx.is_mint() => {
                Err(TxError::invalid("privacy token Init must mint"))
            }
            TokenTxKind::Init if data.token_tx.output_coins().len() != 1 => {
                Err(TxError::invalid("privacy token Init mints exactly one coin"))
            }
            TokenTxKind::Init => {
                self.check_mint_amount()?;
                self.check_derived_id()
            }
            TokenTxKind::Transfer if data.token_tx.is_mint() || data.token_tx.proof.is_none() => {
                Err(TxError::invalid("privacy token Transfer must spend"))
            }
            TokenTxKind::Transfer => Ok(()),
            TokenTxKind::CrossShard => Err(TxError::invalid(
                "privacy tokens do not move across shards",
            )),
        }
    }

    pub fn verify<S: CommitmentStore + ?Sized>(
        &self,
        store: &S,
        is_new_transaction: bool,
    ) -> Result<(), TxError> {
        self.fee_tx.verify(store, is_new_transaction)?;
        self.token_data.token_tx.verify(store, is_new_transaction)
    }

    pub fn validate_against_store<S: CommitmentStore + ?Sized>(&self, store: &S) -> Result<(), TxError> {
        let exists = store.token_exists(self.property_id())?;
        match self.kind() {
            TokenTxKind::Init if exists => Err(TxError::TokenAlreadyExists(*self.property_id())),
            TokenTxKind::Transfer if !exists => Err(TxError::TokenNotFound(*self.property_id())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeySet;
    use crate::privacy::PaymentInfo;
    use crate::storage::LedgerDb;
    use rand::rngs::OsRng;

    fn no_fee() -> PrivacyTx {
        PrivacyTx {
            version: crate::config::TX_VERSION,
            lock_time: 0,
            fee: 0,
            has_privacy: false,
            token_id: NATIVE_TOKEN_ID,
            shard_id: 2,
            info: Vec::new(),
            proof: None,
            sig_public_key: Vec::new(),
            sig: Vec::new(),
        }
    }

    fn identity() -> TokenIdentity {
        TokenIdentity {
            name: "Shadow".into(),
            symbol: "SHD".into(),
        }
    }

    fn mint(owner: &KeySet, amount: u64) -> PrivacyTx {
        let property_id = PrivacyTokenTx::init_property_id(&identity(), amount, 2, None);
        let payment = PaymentInfo {
            address: owner.payment_address(),
            amount,
        };
        PrivacyTx::mint(&[payment], property_id, 2, 0, &mut OsRng).unwrap().0
    }

    #[test]
    fn init_mints_declared_amount() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let tx = PrivacyTokenTx::create_init(no_fee(), identity(), 500, mint(&owner, 500), false, &db)
            .unwrap();
        tx.validate_sanity().unwrap();
        tx.verify(&db, true).unwrap();
        tx.validate_against_store(&db).unwrap();
    }

    #[test]
    fn init_amount_must_match_mint() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let result = PrivacyTokenTx::create_init(no_fee(), identity(), 501, mint(&owner, 500), false, &db);
        assert!(matches!(
            result,
            Err(TxError::ProofVerificationFailed {
                kind: ProofFailure::MintAmount { minted: 500, declared: 501 },
                ..
            })
        ));
    }

    #[test]
    fn init_under_foreign_id_rejected_unless_mintable() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let chosen = Hash::new([5; 32]);
        let payment = PaymentInfo {
            address: owner.payment_address(),
            amount: 500,
        };
        let supply = || PrivacyTx::mint(&[payment.clone()], chosen, 2, 0, &mut OsRng).unwrap().0;

        let squatter = PrivacyTokenTx::create_init(no_fee(), identity(), 500, supply(), false, &db);
        assert!(matches!(squatter, Err(TxError::InvalidTransaction { .. })));

        let mintable = PrivacyTokenTx::create_init(no_fee(), identity(), 500, supply(), true, &db).unwrap();
        mintable.validate_sanity().unwrap();
        let mut forged = mintable;
        forged.token_data.mintable = false;
        assert!(matches!(forged.validate_sanity(), Err(TxError::InvalidTransaction { .. })));
    }

    #[test]
    fn transfer_of_unknown_token_rejected() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let result = PrivacyTokenTx::create_transfer(no_fee(), identity(), mint(&owner, 1), &db);
        assert!(matches!(result, Err(TxError::TokenNotFound(_))));
    }

    #[test]
    fn property_id_depends_on_shard() {
        let a = PrivacyTokenTx::init_property_id(&identity(), 10, 0, None);
        let b = PrivacyTokenTx::init_property_id(&identity(), 10, 1, None);
        assert_ne!(a, b);
        let fixed = Hash::new([7; 32]);
        assert_eq!(PrivacyTokenTx::init_property_id(&identity(), 10, 0, Some(fixed)), fixed);
    }
}
