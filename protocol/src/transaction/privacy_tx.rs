//! # Privacy Transaction
//!
//! A transfer of one token on one shard. The inputs hide in a ring of
//! decoys, the outputs are fresh one-time coins and the payment proof shows
//! those outputs are well-formed.
//!
//! ## Lifecycle
//!
//! ```text
//! PrivacyTx::prove ──► outputs + PaymentProof (unsigned)
//!        │
//!        ▼
//! PrivacyTx::sign  ──► ring built, serial numbers filled in,
//!        │             MLSAG over the proof bytes
//!        ▼
//! PrivacyTx::verify ─► signature → serial numbers → ring vs ledger
//!                      → SND freshness (new txs only) → payment proof
//! ```
//!
//! [`PrivacyTx::create`] does the first two steps in one call.
//!
//! A transaction with no inputs is a **mint**. It carries public openings
//! and no signature, and is only admissible where the caller allows minting
//! (genesis, privacy-token initialization).

use std::collections::HashSet;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::TxError;
use super::ring::{build_ring, fetch_coin, AggregateTerms, RingParams};
use super::signature::RingSignaturePublicKey;
use crate::config::{
    ShardId, MAX_RING_DIMENSION, MAX_TX_INFO_LENGTH, ONE_OUT_OF_MANY_CUTOFF, TX_VERSION,
};
use crate::crypto::hash::{blake3_hash, Hash};
use crate::crypto::keys::KeySet;
use crate::privacy::{
    key_image, Coin, InputCoin, MlsagSignature, OutputCoin, PaymentInfo, PaymentProof, ProofContext,
};
use crate::storage::CommitmentStore;

/// Everything needed to build a spend.
pub struct TxParams<'a> {
    pub sender: &'a KeySet,
    pub inputs: Vec<InputCoin>,
    pub payments: Vec<PaymentInfo>,
    pub fee: u64,
    pub has_privacy: bool,
    pub token_id: Hash,
    pub shard_id: ShardId,
    /// Rows in the ring. Forced to 1 for public transactions.
    pub ring_size: usize,
    pub lock_time: u64,
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyTx {
    pub version: u8,
    /// Unix seconds. Also decides whether the legacy proof carve-out applies.
    pub lock_time: u64,
    pub fee: u64,
    pub has_privacy: bool,
    pub token_id: Hash,
    pub shard_id: ShardId,
    pub info: Vec<u8>,
    /// `None` means the transaction moves nothing of this token.
    pub proof: Option<PaymentProof>,
    /// Encoded [`RingSignaturePublicKey`]. Empty until signed.
    pub sig_public_key: Vec<u8>,
    /// Encoded [`MlsagSignature`]. Empty until signed.
    pub sig: Vec<u8>,
}

/// Current wall-clock time as a lock time.
pub fn current_lock_time() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl PrivacyTx {
    /// Prove and sign in one go. Returns the transaction and the output
    /// coins with their openings, which the recipients need to spend them.
    pub fn create<S, R>(
        mut params: TxParams<'_>,
        store: &S,
        rng: &mut R,
    ) -> Result<(Self, Vec<OutputCoin>), TxError>
    where
        S: CommitmentStore + ?Sized,
        R: RngCore + CryptoRng,
    {
        let (mut tx, outputs) = Self::prove(&params, rng)?;
        let sender = params.sender;
        let ring_size = params.ring_size;
        tx.sign(sender, &mut params.inputs, &outputs, ring_size, store, rng)?;
        Ok((tx, outputs))
    }

    /// Check the balance law and build the unsigned transaction with its
    /// payment proof.
    pub fn prove<R: RngCore + CryptoRng>(
        params: &TxParams<'_>,
        rng: &mut R,
    ) -> Result<(Self, Vec<OutputCoin>), TxError> {
        if params.inputs.is_empty() {
            return Err(TxError::invalid("a spend needs at least one input"));
        }
        if params.has_privacy && params.ring_size < 2 {
            return Err(TxError::invalid(format!(
                "private transaction with ring size {}",
                params.ring_size
            )));
        }
        if params.info.len() > MAX_TX_INFO_LENGTH {
            return Err(TxError::invalid(format!(
                "info of {} bytes exceeds {MAX_TX_INFO_LENGTH}",
                params.info.len()
            )));
        }

        let available = checked_sum(params.inputs.iter().map(|c| c.value))?;
        let paid = checked_sum(params.payments.iter().map(|p| p.amount))?;
        let required = paid
            .checked_add(params.fee)
            .ok_or_else(|| TxError::invalid("payments plus fee overflow"))?;
        if available < required {
            return Err(TxError::InsufficientInput {
                available,
                required,
            });
        }
        if available > required {
            return Err(TxError::BalanceMismatch {
                property_id: params.token_id,
                inputs: available,
                outputs: required,
            });
        }

        let context = ProofContext {
            fee: params.fee,
            token_id: params.token_id,
            shard_id: params.shard_id,
        };
        let (proof, outputs) =
            PaymentProof::prove(&params.payments, params.has_privacy, &context, rng).map_err(
                |e| TxError::SigningError {
                    reason: e.to_string(),
                },
            )?;

        let tx = Self {
            version: TX_VERSION,
            lock_time: params.lock_time,
            fee: params.fee,
            has_privacy: params.has_privacy,
            token_id: params.token_id,
            shard_id: params.shard_id,
            info: params.info.clone(),
            proof: Some(proof),
            sig_public_key: Vec::new(),
            sig: Vec::new(),
        };
        Ok((tx, outputs))
    }

    /// A mint: no inputs, public openings, no fee, no signature.
    pub fn mint<R: RngCore + CryptoRng>(
        payments: &[PaymentInfo],
        token_id: Hash,
        shard_id: ShardId,
        lock_time: u64,
        rng: &mut R,
    ) -> Result<(Self, Vec<OutputCoin>), TxError> {
        if payments.is_empty() {
            return Err(TxError::invalid("a mint needs at least one output"));
        }
        checked_sum(payments.iter().map(|p| p.amount))?;
        let context = ProofContext {
            fee: 0,
            token_id,
            shard_id,
        };
        let (proof, outputs) = PaymentProof::prove(payments, false, &context, rng).map_err(|e| {
            TxError::invalid(format!("mint proof: {e}"))
        })?;
        let tx = Self {
            version: TX_VERSION,
            lock_time,
            fee: 0,
            has_privacy: false,
            token_id,
            shard_id,
            info: Vec::new(),
            proof: Some(proof),
            sig_public_key: Vec::new(),
            sig: Vec::new(),
        };
        Ok((tx, outputs))
    }

    /// Build the ring, fill in the serial numbers and ring-sign the proof.
    /// Fails if the transaction already carries a signature.
    pub fn sign<S, R>(
        &mut self,
        sender: &KeySet,
        inputs: &mut [InputCoin],
        outputs: &[OutputCoin],
        ring_size: usize,
        store: &S,
        rng: &mut R,
    ) -> Result<(), TxError>
    where
        S: CommitmentStore + ?Sized,
        R: RngCore + CryptoRng,
    {
        if !self.sig.is_empty() || !self.sig_public_key.is_empty() {
            return Err(TxError::SigningError {
                reason: "transaction is already signed".into(),
            });
        }
        let ring_size = if self.has_privacy { ring_size } else { 1 };
        let params = RingParams {
            token_id: self.token_id,
            shard_id: self.shard_id,
            fee: self.fee,
            ring_size,
        };
        let built = build_ring(store, sender, inputs, outputs, &params, rng)?;

        let proof = self.proof.as_mut().ok_or_else(|| TxError::SigningError {
            reason: "no payment proof to sign".into(),
        })?;
        let serial_numbers: Vec<_> = built.private_keys[..inputs.len()]
            .iter()
            .map(key_image)
            .collect();
        for (input, sn) in inputs.iter_mut().zip(&serial_numbers) {
            input.serial_number = Some(*sn);
        }
        proof.serial_numbers = serial_numbers;

        let message = proof.to_bytes();
        let signature = MlsagSignature::sign(
            &message,
            &built.ring,
            built.real_index,
            &built.private_keys,
            rng,
        )
        .map_err(|e| TxError::SigningError {
            reason: e.to_string(),
        })?;

        self.sig_public_key = RingSignaturePublicKey::new(built.ring, built.indexes)?.to_bytes();
        self.sig = signature.to_bytes();
        debug!(tx = %self.hash(), rows = ring_size, "transaction signed");
        Ok(())
    }

    /// Canonical encoding. Hashing and fee sizing both use it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.version);
        out.extend_from_slice(&self.lock_time.to_be_bytes());
        out.extend_from_slice(&self.fee.to_be_bytes());
        out.push(self.has_privacy as u8);
        out.extend_from_slice(self.token_id.as_bytes());
        out.push(self.shard_id);
        write_chunk(&mut out, &self.info);
        match &self.proof {
            Some(proof) => {
                out.push(1);
                write_chunk(&mut out, &proof.to_bytes());
            }
            None => out.push(0),
        }
        write_chunk(&mut out, &self.sig_public_key);
        write_chunk(&mut out, &self.sig);
        out
    }

    pub fn hash(&self) -> Hash {
        Hash::new(blake3_hash(&self.to_bytes()))
    }

    pub fn size(&self) -> usize {
        self.to_bytes().len()
    }

    /// No inputs but at least one output.
    pub fn is_mint(&self) -> bool {
        self.proof
            .as_ref()
            .is_some_and(|p| p.serial_numbers.is_empty() && !p.output_coins.is_empty())
    }

    pub fn serial_numbers(&self) -> &[CompressedRistretto] {
        self.proof.as_ref().map_or(&[], |p| &p.serial_numbers)
    }

    pub fn output_coins(&self) -> &[Coin] {
        self.proof.as_ref().map_or(&[], |p| &p.output_coins)
    }

    /// Structural checks that need no ledger.
    pub fn validate_sanity(&self) -> Result<(), TxError> {
        if self.version != TX_VERSION {
            return Err(TxError::invalid(format!("unsupported version {}", self.version)));
        }
        if self.info.len() > MAX_TX_INFO_LENGTH {
            return Err(TxError::invalid(format!(
                "info of {} bytes exceeds {MAX_TX_INFO_LENGTH}",
                self.info.len()
            )));
        }
        let Some(proof) = &self.proof else {
            if self.fee != 0 || !self.sig.is_empty() || !self.sig_public_key.is_empty() {
                return Err(TxError::invalid("transaction without a proof carries fee or signature"));
            }
            return Ok(());
        };

        if proof.serial_numbers.is_empty() {
            if proof.output_coins.is_empty() {
                return Err(TxError::invalid("proof moves nothing"));
            }
            if self.fee != 0 || self.has_privacy || !self.sig.is_empty() || !self.sig_public_key.is_empty() {
                return Err(TxError::invalid("a mint is public, fee-free and unsigned"));
            }
        } else if self.sig.is_empty() || self.sig_public_key.is_empty() {
            return Err(TxError::invalid("spend is not signed"));
        }

        if self.has_privacy && !proof.openings.is_empty() {
            return Err(TxError::invalid("private transaction reveals openings"));
        }
        if !self.has_privacy && !proof.range_proofs.is_empty() {
            return Err(TxError::invalid("public transaction carries range proofs"));
        }
        if proof.serial_numbers.len() + 1 > MAX_RING_DIMENSION {
            return Err(TxError::invalid("too many inputs"));
        }
        Ok(())
    }

    /// Full cryptographic verification against `store`.
    pub fn verify<S: CommitmentStore + ?Sized>(
        &self,
        store: &S,
        is_new_transaction: bool,
    ) -> Result<(), TxError> {
        let Some(proof) = &self.proof else {
            return Ok(());
        };
        let tx_hash = self.hash();

        if proof.serial_numbers.is_empty() {
            return self.verify_mint(proof, store, is_new_transaction, tx_hash);
        }

        let blob = self.verify_signature(proof, tx_hash)?;
        self.verify_ring_against_ledger(proof, &blob, store)?;
        if is_new_transaction {
            self.verify_fresh_snds(proof, store)?;
        }

        match proof.verify(&self.proof_context()) {
            Ok(()) => Ok(()),
            Err(kind)
                if kind.is_one_out_of_many()
                    && !is_new_transaction
                    && self.lock_time <= ONE_OUT_OF_MANY_CUTOFF =>
            {
                warn!(tx = %tx_hash, lock_time = self.lock_time, %kind, "accepting legacy proof failure");
                Ok(())
            }
            Err(kind) => Err(TxError::ProofVerificationFailed { tx_hash, kind }),
        }
    }

    fn proof_context(&self) -> ProofContext {
        ProofContext {
            fee: self.fee,
            token_id: self.token_id,
            shard_id: self.shard_id,
        }
    }

    fn verify_mint<S: CommitmentStore + ?Sized>(
        &self,
        proof: &PaymentProof,
        store: &S,
        is_new_transaction: bool,
        tx_hash: Hash,
    ) -> Result<(), TxError> {
        if !self.sig.is_empty() || !self.sig_public_key.is_empty() || proof.is_private() {
            return Err(TxError::invalid("a mint is public and unsigned"));
        }
        if is_new_transaction {
            self.verify_fresh_snds(proof, store)?;
        }
        proof
            .verify(&self.proof_context())
            .map_err(|kind| TxError::ProofVerificationFailed { tx_hash, kind })
    }

    fn verify_signature(
        &self,
        proof: &PaymentProof,
        tx_hash: Hash,
    ) -> Result<RingSignaturePublicKey, TxError> {
        let sig_failed = |reason: String| TxError::SignatureVerificationFailed { tx_hash, reason };

        // Framing errors are malformed bytes. A well-framed blob whose ring
        // does not decode is a forged ring.
        let (ring_bytes, indexes) = RingSignaturePublicKey::split(&self.sig_public_key)?;
        let blob = RingSignaturePublicKey::assemble(ring_bytes, indexes).map_err(|e| sig_failed(e.to_string()))?;
        let signature = MlsagSignature::from_bytes(&self.sig).map_err(|e| TxError::malformed(e.to_string()))?;

        let rows = blob.ring.rows();
        if self.has_privacy == (rows == 1) {
            return Err(TxError::malformed(format!(
                "ring of {rows} rows on a {} transaction",
                if self.has_privacy { "private" } else { "public" }
            )));
        }
        if blob.ring.columns() != proof.serial_numbers.len() + 1 {
            return Err(sig_failed(format!(
                "ring has {} columns for {} inputs",
                blob.ring.columns(),
                proof.serial_numbers.len()
            )));
        }

        signature
            .verify(&proof.to_bytes(), &blob.ring)
            .map_err(|e| sig_failed(e.to_string()))?;
        if signature.key_images != proof.serial_numbers {
            return Err(sig_failed("serial numbers do not match key images".into()));
        }
        Ok(blob)
    }

    fn verify_ring_against_ledger<S: CommitmentStore + ?Sized>(
        &self,
        proof: &PaymentProof,
        blob: &RingSignaturePublicKey,
        store: &S,
    ) -> Result<(), TxError> {
        let terms = AggregateTerms::new(self.fee, &proof.output_coins, self.shard_id)?;
        let aggregate_column = blob.ring.columns() - 1;

        for (row, row_indexes) in blob.indexes.iter().enumerate() {
            let mut sum = RistrettoPoint::default();
            for (column, &index) in row_indexes.iter().enumerate() {
                let inconsistent = |reason: &str| TxError::RingInconsistentWithLedger {
                    row,
                    column,
                    reason: reason.into(),
                };
                if !store.has_commitment_index(&self.token_id, index, self.shard_id)? {
                    return Err(inconsistent("index not in the ledger"));
                }
                let coin = fetch_coin(store, &self.token_id, index, self.shard_id)?;
                if coin.public_key != *blob.ring.key(row, column) {
                    return Err(inconsistent("public key differs from the ledger coin"));
                }
                sum += coin
                    .value_commitment(self.shard_id)
                    .ok_or_else(|| inconsistent("ledger coin is not a valid commitment"))?;
            }

            if terms.for_row(sum).compress() != *blob.ring.key(row, aggregate_column) {
                return Err(TxError::RingInconsistentWithLedger {
                    row,
                    column: aggregate_column,
                    reason: "aggregate does not match the ledger".into(),
                });
            }
        }
        Ok(())
    }

    fn verify_fresh_snds<S: CommitmentStore + ?Sized>(
        &self,
        proof: &PaymentProof,
        store: &S,
    ) -> Result<(), TxError> {
        let mut seen = HashSet::with_capacity(proof.output_coins.len());
        for (output, coin) in proof.output_coins.iter().enumerate() {
            if !seen.insert(coin.snd.to_bytes()) || store.has_snd(&self.token_id, &coin.snd, self.shard_id)? {
                return Err(TxError::SndAlreadyExists {
                    output,
                    shard_id: self.shard_id,
                });
            }
        }
        Ok(())
    }
}

fn checked_sum(mut values: impl Iterator<Item = u64>) -> Result<u64, TxError> {
    values
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(|| TxError::invalid("amounts overflow"))
}

fn write_chunk(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NATIVE_TOKEN_ID;
    use crate::privacy::ProofFailure;
    use crate::storage::LedgerDb;
    use crate::transaction::test_support::{fund, seed_decoys};
    use rand::rngs::OsRng;

    const SHARD: ShardId = 0;

    struct Fixture {
        db: LedgerDb,
        sender: KeySet,
        recipient: KeySet,
        inputs: Vec<InputCoin>,
    }

    fn fixture(values: &[u64]) -> Fixture {
        let db = LedgerDb::open_temporary().unwrap();
        let sender = KeySet::generate();
        seed_decoys(&db, NATIVE_TOKEN_ID, SHARD, 12);
        let inputs = fund(&db, &sender, values, NATIVE_TOKEN_ID, SHARD);
        Fixture {
            db,
            sender,
            recipient: KeySet::generate(),
            inputs,
        }
    }

    fn params<'a>(f: &'a Fixture, payments: Vec<PaymentInfo>, fee: u64, lock_time: u64) -> TxParams<'a> {
        TxParams {
            sender: &f.sender,
            inputs: f.inputs.clone(),
            payments,
            fee,
            has_privacy: true,
            token_id: NATIVE_TOKEN_ID,
            shard_id: SHARD,
            ring_size: 4,
            lock_time,
            info: Vec::new(),
        }
    }

    fn pay(to: &KeySet, amount: u64) -> PaymentInfo {
        PaymentInfo {
            address: to.payment_address(),
            amount,
        }
    }

    #[test]
    fn create_and_verify_private_transfer() {
        let f = fixture(&[5, 3]);
        let (tx, outputs) = PrivacyTx::create(
            params(&f, vec![pay(&f.recipient, 7)], 1, current_lock_time()),
            &f.db,
            &mut OsRng,
        )
        .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(tx.serial_numbers().len(), 2);
        tx.validate_sanity().unwrap();
        tx.verify(&f.db, true).unwrap();
    }

    #[test]
    fn public_transfer_uses_single_row() {
        let f = fixture(&[4]);
        let mut p = params(&f, vec![pay(&f.recipient, 4)], 0, current_lock_time());
        p.has_privacy = false;
        p.ring_size = 8;
        let (tx, _) = PrivacyTx::create(p, &f.db, &mut OsRng).unwrap();
        let blob = RingSignaturePublicKey::from_bytes(&tx.sig_public_key).unwrap();
        assert_eq!(blob.ring.rows(), 1);
        tx.verify(&f.db, true).unwrap();
    }

    #[test]
    fn unbalanced_payments_rejected() {
        let f = fixture(&[5]);
        let short = PrivacyTx::prove(&params(&f, vec![pay(&f.recipient, 3)], 1, 0), &mut OsRng);
        assert!(matches!(short, Err(TxError::BalanceMismatch { .. })));
        let over = PrivacyTx::prove(&params(&f, vec![pay(&f.recipient, 5)], 1, 0), &mut OsRng);
        assert!(matches!(over, Err(TxError::InsufficientInput { available: 5, required: 6 })));
    }

    #[test]
    fn private_ring_of_one_rejected() {
        let f = fixture(&[5]);
        let mut p = params(&f, vec![pay(&f.recipient, 5)], 0, 0);
        p.ring_size = 1;
        assert!(matches!(
            PrivacyTx::prove(&p, &mut OsRng),
            Err(TxError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn signing_twice_fails() {
        let f = fixture(&[2]);
        let p = params(&f, vec![pay(&f.recipient, 2)], 0, 0);
        let (mut tx, outputs) = PrivacyTx::prove(&p, &mut OsRng).unwrap();
        let mut inputs = f.inputs.clone();
        tx.sign(&f.sender, &mut inputs, &outputs, 4, &f.db, &mut OsRng).unwrap();
        assert!(inputs.iter().all(|c| c.serial_number.is_some()));
        let again = tx.sign(&f.sender, &mut inputs, &outputs, 4, &f.db, &mut OsRng);
        assert!(matches!(again, Err(TxError::SigningError { .. })));
    }

    #[test]
    fn foreign_input_cannot_be_signed() {
        let f = fixture(&[2]);
        let thief = KeySet::generate();
        let mut p = params(&f, vec![pay(&f.recipient, 2)], 0, 0);
        p.sender = &thief;
        assert!(matches!(
            PrivacyTx::create(p, &f.db, &mut OsRng),
            Err(TxError::SigningError { .. })
        ));
    }

    #[test]
    fn reused_snd_rejected_only_for_new_transactions() {
        let f = fixture(&[3]);
        let (tx, _) =
            PrivacyTx::create(params(&f, vec![pay(&f.recipient, 3)], 0, 0), &f.db, &mut OsRng)
                .unwrap();
        let snd = tx.output_coins()[0].snd;
        f.db.store_snds(&NATIVE_TOKEN_ID, SHARD, &[snd]).unwrap();

        assert!(matches!(
            tx.verify(&f.db, true),
            Err(TxError::SndAlreadyExists { output: 0, shard_id: SHARD })
        ));
        tx.verify(&f.db, false).unwrap();
    }

    #[test]
    fn tampered_fee_breaks_signature() {
        let f = fixture(&[5, 3]);
        let (mut tx, _) =
            PrivacyTx::create(params(&f, vec![pay(&f.recipient, 7)], 1, 0), &f.db, &mut OsRng)
                .unwrap();
        tx.fee = 0;
        assert!(tx.verify(&f.db, true).is_err());
    }

    fn corrupted_at(lock_time: u64) -> (Fixture, PrivacyTx) {
        let f = fixture(&[6]);
        let p = params(&f, vec![pay(&f.recipient, 6)], 0, lock_time);
        let (mut tx, outputs) = PrivacyTx::prove(&p, &mut OsRng).unwrap();
        tx.proof.as_mut().unwrap().corrupt_range_bit(0, 5);
        let mut inputs = f.inputs.clone();
        tx.sign(&f.sender, &mut inputs, &outputs, 4, &f.db, &mut OsRng).unwrap();
        (f, tx)
    }

    #[test]
    fn legacy_one_out_of_many_failure_accepted_at_cutoff() {
        let (f, tx) = corrupted_at(ONE_OUT_OF_MANY_CUTOFF);
        tx.verify(&f.db, false).unwrap();
    }

    #[test]
    fn legacy_carve_out_never_applies_to_new_transactions() {
        let (f, tx) = corrupted_at(ONE_OUT_OF_MANY_CUTOFF);
        match tx.verify(&f.db, true) {
            Err(TxError::ProofVerificationFailed {
                kind: ProofFailure::OneOutOfMany { output: 0, bit: 5 },
                ..
            }) => {}
            other => panic!("expected OneOutOfMany failure, got {:?}", other),
        }
    }

    #[test]
    fn carve_out_ends_after_cutoff() {
        let (f, tx) = corrupted_at(ONE_OUT_OF_MANY_CUTOFF + 1);
        assert!(matches!(
            tx.verify(&f.db, false),
            Err(TxError::ProofVerificationFailed { .. })
        ));
    }

    #[test]
    fn mint_verifies_and_reveals_amount() {
        let db = LedgerDb::open_temporary().unwrap();
        let owner = KeySet::generate();
        let (tx, outputs) =
            PrivacyTx::mint(&[pay(&owner, 1_000)], NATIVE_TOKEN_ID, SHARD, 0, &mut OsRng).unwrap();
        assert!(tx.is_mint());
        assert_eq!(outputs[0].value, 1_000);
        assert_eq!(tx.proof.as_ref().unwrap().revealed_value(), 1_000);
        tx.validate_sanity().unwrap();
        tx.verify(&db, true).unwrap();
    }

    #[test]
    fn hash_covers_signature() {
        let f = fixture(&[1]);
        let (tx, _) =
            PrivacyTx::create(params(&f, vec![pay(&f.recipient, 1)], 0, 0), &f.db, &mut OsRng)
                .unwrap();
        let mut other = tx.clone();
        other.sig[0] ^= 1;
        assert_ne!(tx.hash(), other.hash());
    }
}
