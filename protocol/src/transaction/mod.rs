//! # Transaction Module
//!
//! Construction and verification of every transaction kind the ledger
//! accepts.
//!
//! ## Architecture
//!
//! ```text
//! error.rs          : TxError taxonomy and DoubleSpendLayer
//! ring.rs           : ring builder: decoy sampling and the aggregate column
//! signature.rs      : proof-of-ring blob (ring + commitment index grid)
//! privacy_tx.rs     : PrivacyTx: prove, sign, verify, mint
//! custom_token.rs   : vin/vout custom tokens (Init, Transfer, CrossShard)
//! privacy_token.rs  : custom tokens carried as privacy coins
//! ```
//!
//! ## Validation pipeline
//!
//! Every kind implements [`Validation`]. Callers run the three checks in
//! order, and any error stops the pipeline:
//!
//! 1. [`Validation::validate_sanity`]: shape only, no ledger.
//! 2. [`Validation::verify_proof`]: signatures and proofs against the
//!    commitment ledger.
//! 3. [`Validation::validate_against_ledger`]: double spends and token
//!    existence.
//!
//! Dispatch goes through a `match` on [`Transaction`]. There is no trait
//! object anywhere in the pipeline.

pub mod custom_token;
pub mod error;
pub mod privacy_token;
pub mod privacy_tx;
pub mod ring;
pub mod signature;

use curve25519_dalek::ristretto::CompressedRistretto;
use serde::{Deserialize, Serialize};

pub use custom_token::{
    CustomTokenTx, TokenIdentity, TokenTxKind, TxTokenData, TxTokenVin, TxTokenVout, UtxoSet,
};
pub use error::{DoubleSpendLayer, TxError};
pub use privacy_token::{PrivacyTokenTx, TxPrivacyTokenData};
pub use privacy_tx::{current_lock_time, PrivacyTx, TxParams};
pub use ring::{build_ring, BuiltRing, RingParams};
pub use signature::RingSignaturePublicKey;

use crate::config::ShardId;
use crate::crypto::hash::Hash;
use crate::storage::{CommitmentStore, LedgerView};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Normal(PrivacyTx),
    CustomToken(CustomTokenTx),
    PrivacyToken(PrivacyTokenTx),
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        match self {
            Self::Normal(tx) => tx.hash(),
            Self::CustomToken(tx) => tx.hash(),
            Self::PrivacyToken(tx) => tx.hash(),
        }
    }

    pub fn shard_id(&self) -> ShardId {
        match self {
            Self::Normal(tx) => tx.shard_id,
            Self::CustomToken(tx) => tx.shard_id(),
            Self::PrivacyToken(tx) => tx.shard_id(),
        }
    }

    /// Native fee.
    pub fn fee(&self) -> u64 {
        self.fee_tx().fee
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Normal(tx) => tx.size(),
            Self::CustomToken(tx) => tx.size(),
            Self::PrivacyToken(tx) => tx.size(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Normal(_) => "normal",
            Self::CustomToken(_) => "custom-token",
            Self::PrivacyToken(_) => "privacy-token",
        }
    }

    /// The transaction that pays the native fee.
    pub fn fee_tx(&self) -> &PrivacyTx {
        match self {
            Self::Normal(tx) => tx,
            Self::CustomToken(tx) => tx.fee_tx(),
            Self::PrivacyToken(tx) => &tx.fee_tx,
        }
    }

    /// Every privacy transaction inside, fee transaction first.
    pub fn privacy_txs(&self) -> Vec<&PrivacyTx> {
        match self {
            Self::Normal(tx) => vec![tx],
            Self::CustomToken(tx) => vec![tx.fee_tx()],
            Self::PrivacyToken(tx) => vec![&tx.fee_tx, &tx.token_data.token_tx],
        }
    }

    /// `(token ID, serial number)` of every input spent.
    pub fn serial_numbers(&self) -> Vec<(Hash, CompressedRistretto)> {
        self.privacy_txs()
            .into_iter()
            .flat_map(|tx| tx.serial_numbers().iter().map(move |sn| (tx.token_id, *sn)))
            .collect()
    }

    pub fn as_custom_token(&self) -> Option<&CustomTokenTx> {
        match self {
            Self::CustomToken(tx) => Some(tx),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Where and why a transaction is being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyContext {
    pub shard_id: ShardId,
    /// True when admitting fresh work (pool, new block). False when
    /// replaying settled history.
    pub is_new_transaction: bool,
    /// Mints are only admissible in the genesis block.
    pub allow_mint: bool,
}

impl VerifyContext {
    pub fn new_transaction(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            is_new_transaction: true,
            allow_mint: false,
        }
    }

    pub fn replay(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            is_new_transaction: false,
            allow_mint: false,
        }
    }

    pub fn genesis(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            is_new_transaction: true,
            allow_mint: true,
        }
    }
}

/// The checks every transaction kind supports.
pub trait Validation {
    fn validate_sanity(&self) -> Result<(), TxError>;

    fn verify_proof<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError>;

    fn validate_against_ledger<L: LedgerView + ?Sized>(&self, ledger: &L) -> Result<(), TxError>;

    /// All three, in order.
    fn validate<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError> {
        self.validate_sanity()?;
        self.verify_proof(ledger, ctx)?;
        self.validate_against_ledger(ledger)
    }
}

fn check_shard(tx_shard: ShardId, ctx: &VerifyContext) -> Result<(), TxError> {
    if tx_shard != ctx.shard_id {
        return Err(TxError::invalid(format!(
            "transaction of shard {tx_shard} verified on shard {}",
            ctx.shard_id
        )));
    }
    Ok(())
}

/// No input of `tx` may already be spent.
fn check_unspent<S: CommitmentStore + ?Sized>(store: &S, tx: &PrivacyTx) -> Result<(), TxError> {
    for sn in tx.serial_numbers() {
        if store.has_serial_number(&tx.token_id, sn, tx.shard_id)? {
            return Err(TxError::DoubleSpendDetected {
                layer: DoubleSpendLayer::SerialNumber,
                detail: format!(
                    "serial number {} of token {} already spent on shard {}",
                    hex::encode(sn.as_bytes()),
                    tx.token_id,
                    tx.shard_id
                ),
            });
        }
    }
    Ok(())
}

impl Validation for PrivacyTx {
    fn validate_sanity(&self) -> Result<(), TxError> {
        PrivacyTx::validate_sanity(self)
    }

    fn verify_proof<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError> {
        check_shard(self.shard_id, ctx)?;
        if self.is_mint() && !ctx.allow_mint {
            return Err(TxError::invalid("mint outside the genesis block"));
        }
        self.verify(ledger, ctx.is_new_transaction)
    }

    fn validate_against_ledger<L: LedgerView + ?Sized>(&self, ledger: &L) -> Result<(), TxError> {
        check_unspent(ledger, self)
    }
}

impl Validation for CustomTokenTx {
    fn validate_sanity(&self) -> Result<(), TxError> {
        CustomTokenTx::validate_sanity(self)
    }

    fn verify_proof<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError> {
        check_shard(self.shard_id(), ctx)?;
        self.fee_tx().verify(ledger, ctx.is_new_transaction)?;
        if self.kind() == TokenTxKind::Transfer {
            let utxos = UtxoSet::fetch(self, ledger)?;
            self.validate_transfer(&utxos)?;
        }
        Ok(())
    }

    fn validate_against_ledger<L: LedgerView + ?Sized>(&self, ledger: &L) -> Result<(), TxError> {
        check_unspent(ledger, self.fee_tx())?;
        if self.kind() == TokenTxKind::Init && ledger.token_exists(self.property_id())? {
            return Err(TxError::TokenAlreadyExists(*self.property_id()));
        }
        self.check_chain_double_spend(ledger)
    }
}

impl Validation for PrivacyTokenTx {
    fn validate_sanity(&self) -> Result<(), TxError> {
        PrivacyTokenTx::validate_sanity(self)
    }

    fn verify_proof<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError> {
        check_shard(self.shard_id(), ctx)?;
        self.verify(ledger, ctx.is_new_transaction)
    }

    fn validate_against_ledger<L: LedgerView + ?Sized>(&self, ledger: &L) -> Result<(), TxError> {
        check_unspent(ledger, &self.fee_tx)?;
        check_unspent(ledger, &self.token_data.token_tx)?;
        self.validate_against_store(ledger)
    }
}

impl Validation for Transaction {
    fn validate_sanity(&self) -> Result<(), TxError> {
        match self {
            Self::Normal(tx) => Validation::validate_sanity(tx),
            Self::CustomToken(tx) => Validation::validate_sanity(tx),
            Self::PrivacyToken(tx) => Validation::validate_sanity(tx),
        }
    }

    fn verify_proof<L: LedgerView + ?Sized>(&self, ledger: &L, ctx: &VerifyContext) -> Result<(), TxError> {
        match self {
            Self::Normal(tx) => tx.verify_proof(ledger, ctx),
            Self::CustomToken(tx) => tx.verify_proof(ledger, ctx),
            Self::PrivacyToken(tx) => tx.verify_proof(ledger, ctx),
        }
    }

    fn validate_against_ledger<L: LedgerView + ?Sized>(&self, ledger: &L) -> Result<(), TxError> {
        match self {
            Self::Normal(tx) => tx.validate_against_ledger(ledger),
            Self::CustomToken(tx) => tx.validate_against_ledger(ledger),
            Self::PrivacyToken(tx) => tx.validate_against_ledger(ledger),
        }
    }
}
