//! # Payment Proof
//!
//! The zero-knowledge half of a privacy transaction. The ring signature
//! proves ownership and balance. The payment proof proves the outputs are
//! well-formed:
//!
//! - **private** transactions attach a 64-bit [`RangeProof`] per output, so
//!   no output can hide a negative value that wraps mod ℓ;
//! - **public** transactions (ring size 1) reveal each output's opening
//!   `(value, randomness)` instead.
//!
//! Every proof is bound to the transaction's public context
//! `(fee, token ID, shard ID)` plus the output's position, so a proof cannot
//! be lifted into a different transaction.
//!
//! The serial numbers (key images) of the inputs also live here. They are
//! filled in by the signer before the signature is computed over
//! [`PaymentProof::to_bytes`], which makes them part of the signed message.

use std::collections::HashSet;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::coin::{Coin, OutputCoin, PaymentInfo};
use super::commitment::generators;
use super::range::{RangeProof, RangeProofError};
use crate::config::ShardId;
use crate::crypto::hash::Hash;
use crate::crypto::keys::KeyError;

// ---------------------------------------------------------------------------
// Context & failures
// ---------------------------------------------------------------------------

/// Public parameters every proof component is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofContext {
    pub fee: u64,
    pub token_id: Hash,
    pub shard_id: ShardId,
}

impl ProofContext {
    fn for_output(&self, output: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 32 + 1 + 4);
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(self.token_id.as_bytes());
        out.push(self.shard_id);
        out.extend_from_slice(&(output as u32).to_le_bytes());
        out
    }
}

/// Which component of a payment proof failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofFailure {
    #[error("malformed proof: {0}")]
    Structure(String),

    #[error("output {output}, bit {bit}: one-out-of-many proof failed")]
    OneOutOfMany { output: usize, bit: usize },

    #[error("output {output}: range proof failed: {reason}")]
    RangeProof { output: usize, reason: String },

    #[error("output {output}: opening does not match commitment")]
    Opening { output: usize },

    #[error("output {output}: commitment or key is not a valid point")]
    InvalidPoint { output: usize },

    #[error("serial number {index} appears more than once")]
    DuplicateSerialNumber { index: usize },

    #[error("minted {minted}, declared {declared}")]
    MintAmount { minted: u64, declared: u64 },
}

impl ProofFailure {
    /// True for the sub-kind the legacy verification carve-out applies to.
    pub fn is_one_out_of_many(&self) -> bool {
        matches!(self, Self::OneOutOfMany { .. })
    }
}

/// Errors while building a proof.
#[derive(Debug, Error)]
pub enum ProveError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Range(#[from] RangeProofError),
}

/// A revealed output opening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub value: u64,
    pub randomness: Scalar,
}

// ---------------------------------------------------------------------------
// PaymentProof
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Key images of the inputs, one per input, set by the signer.
    pub serial_numbers: Vec<CompressedRistretto>,
    pub output_coins: Vec<Coin>,
    /// One per output when private, empty otherwise.
    pub range_proofs: Vec<RangeProof>,
    /// One per output when public, empty otherwise.
    pub openings: Vec<Opening>,
}

impl PaymentProof {
    /// Create the output coins for `payments` and prove them.
    pub fn prove<R: RngCore + CryptoRng>(
        payments: &[PaymentInfo],
        has_privacy: bool,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<(Self, Vec<OutputCoin>), ProveError> {
        let mut outputs = Vec::with_capacity(payments.len());
        let mut range_proofs = Vec::new();
        let mut openings = Vec::new();

        for (index, payment) in payments.iter().enumerate() {
            let randomness = if has_privacy {
                let (proof, randomness) =
                    RangeProof::prove(payment.amount, &context.for_output(index), rng)?;
                range_proofs.push(proof);
                randomness
            } else {
                let randomness = Scalar::random(rng);
                openings.push(Opening {
                    value: payment.amount,
                    randomness,
                });
                randomness
            };
            outputs.push(OutputCoin::new(
                &payment.address,
                payment.amount,
                randomness,
                context.shard_id,
                rng,
            )?);
        }

        let proof = Self {
            serial_numbers: Vec::new(),
            output_coins: outputs.iter().map(|o| o.coin).collect(),
            range_proofs,
            openings,
        };
        Ok((proof, outputs))
    }

    pub fn is_private(&self) -> bool {
        !self.range_proofs.is_empty()
    }

    /// Sum of revealed output values. Zero for private proofs.
    pub fn revealed_value(&self) -> u64 {
        self.openings.iter().map(|o| o.value).fold(0u64, u64::saturating_add)
    }

    /// Verify every output against `context`.
    pub fn verify(&self, context: &ProofContext) -> Result<(), ProofFailure> {
        let mut seen = HashSet::with_capacity(self.serial_numbers.len());
        for (index, sn) in self.serial_numbers.iter().enumerate() {
            if !seen.insert(*sn) {
                return Err(ProofFailure::DuplicateSerialNumber { index });
            }
        }

        let outputs = self.output_coins.len();
        let (private, public) = (self.range_proofs.len(), self.openings.len());
        let shape_ok = (private == outputs && public == 0) || (public == outputs && private == 0);
        if !shape_ok {
            return Err(ProofFailure::Structure(format!(
                "{outputs} outputs with {private} range proofs and {public} openings"
            )));
        }

        let gens = generators();
        for (output, coin) in self.output_coins.iter().enumerate() {
            let value_commitment = coin
                .value_commitment(context.shard_id)
                .ok_or(ProofFailure::InvalidPoint { output })?;

            if let Some(proof) = self.range_proofs.get(output) {
                proof
                    .verify(&value_commitment, &context.for_output(output))
                    .map_err(|err| match err {
                        RangeProofError::BitProof { bit, .. } => {
                            ProofFailure::OneOutOfMany { output, bit }
                        }
                        other => ProofFailure::RangeProof {
                            output,
                            reason: other.to_string(),
                        },
                    })?;
            } else if let Some(opening) = self.openings.get(output) {
                if gens.commit_value(opening.value, &opening.randomness) != value_commitment {
                    return Err(ProofFailure::Opening { output });
                }
            }
        }
        Ok(())
    }

    /// Canonical bytes. This is the message the ring signature signs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.serial_numbers.len() as u32).to_be_bytes());
        for sn in &self.serial_numbers {
            out.extend_from_slice(sn.as_bytes());
        }
        out.extend_from_slice(&(self.output_coins.len() as u32).to_be_bytes());
        for coin in &self.output_coins {
            out.extend_from_slice(coin.public_key.as_bytes());
            out.extend_from_slice(coin.commitment.as_bytes());
            out.extend_from_slice(coin.snd.as_bytes());
        }
        out.extend_from_slice(&(self.range_proofs.len() as u32).to_be_bytes());
        for proof in &self.range_proofs {
            proof.write_bytes(&mut out);
        }
        out.extend_from_slice(&(self.openings.len() as u32).to_be_bytes());
        for opening in &self.openings {
            out.extend_from_slice(&opening.value.to_be_bytes());
            out.extend_from_slice(opening.randomness.as_bytes());
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn corrupt_range_bit(&mut self, output: usize, bit: usize) {
        self.range_proofs[output].corrupt_bit(bit);
    }
}
