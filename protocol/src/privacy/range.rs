//! Bit-decomposition range proof for output values.
//!
//! A value `v < 2^64` is split into bits `b_i`. Each bit gets its own
//! commitment `C_i = b_i·Gv + r_i·G` and a one-out-of-many proof over
//! `{C_i, C_i − Gv}`: whichever of the two is a pure multiple of `G` tells
//! the verifier the bit is 0 or 1, without telling it which.
//!
//! The output's blinding factor is fixed by the bits, `r = Σ 2^i·r_i`, so
//! `Σ 2^i·C_i` must equal the output's value commitment exactly.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::commitment::generators;
use super::one_of_many::{OneOutOfManyError, OneOutOfManyProof};
use crate::config::RANGE_PROOF_BITS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeProofError {
    #[error("range proof has {got} bits, expected {expected}")]
    BitCount { expected: usize, got: usize },

    #[error("bit commitment {bit} is not a valid point")]
    InvalidBitCommitment { bit: usize },

    #[error("bit commitments do not add up to the value commitment")]
    AggregateMismatch,

    #[error("bit {bit}: {source}")]
    BitProof {
        bit: usize,
        #[source]
        source: OneOutOfManyError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof {
    bit_commitments: Vec<CompressedRistretto>,
    bit_proofs: Vec<OneOutOfManyProof>,
}

impl RangeProof {
    /// Prove `value` is in range. Returns the proof and the blinding factor
    /// the output commitment must use.
    pub fn prove<R: RngCore + CryptoRng>(
        value: u64,
        context: &[u8],
        rng: &mut R,
    ) -> Result<(Self, Scalar), RangeProofError> {
        let gens = generators();
        let mut bit_commitments = Vec::with_capacity(RANGE_PROOF_BITS);
        let mut bit_proofs = Vec::with_capacity(RANGE_PROOF_BITS);
        let mut randomness = Scalar::ZERO;
        let mut weight = Scalar::ONE;

        for bit in 0..RANGE_PROOF_BITS {
            let b = (value >> bit) & 1;
            let r = Scalar::random(rng);
            let c = gens.commit_value(b, &r);
            let candidates = [c, c - gens.value];
            let proof = OneOutOfManyProof::prove(&candidates, b as usize, &r, &bit_context(context, bit), rng)
                .map_err(|source| RangeProofError::BitProof { bit, source })?;

            bit_commitments.push(c.compress());
            bit_proofs.push(proof);
            randomness += weight * r;
            weight += weight;
        }

        Ok((
            Self {
                bit_commitments,
                bit_proofs,
            },
            randomness,
        ))
    }

    /// Check the proof against an output's value commitment `v·Gv + r·G`.
    pub fn verify(&self, value_commitment: &RistrettoPoint, context: &[u8]) -> Result<(), RangeProofError> {
        if self.bit_commitments.len() != RANGE_PROOF_BITS || self.bit_proofs.len() != RANGE_PROOF_BITS {
            return Err(RangeProofError::BitCount {
                expected: RANGE_PROOF_BITS,
                got: self.bit_commitments.len().min(self.bit_proofs.len()),
            });
        }

        let gens = generators();
        let mut sum = RistrettoPoint::default();
        let mut weight = Scalar::ONE;
        for (bit, (compressed, proof)) in self.bit_commitments.iter().zip(&self.bit_proofs).enumerate() {
            let c = compressed
                .decompress()
                .ok_or(RangeProofError::InvalidBitCommitment { bit })?;
            proof
                .verify(&[c, c - gens.value], &bit_context(context, bit))
                .map_err(|source| RangeProofError::BitProof { bit, source })?;
            sum += weight * c;
            weight += weight;
        }

        if sum == *value_commitment {
            Ok(())
        } else {
            Err(RangeProofError::AggregateMismatch)
        }
    }

    /// Append the canonical encoding used in signed transaction bytes.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.bit_commitments.len() as u32).to_be_bytes());
        for (commitment, proof) in self.bit_commitments.iter().zip(&self.bit_proofs) {
            out.extend_from_slice(commitment.as_bytes());
            proof.write_bytes(out);
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_bit(&mut self, bit: usize) {
        self.bit_proofs[bit].corrupt();
    }
}

fn bit_context(context: &[u8], bit: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(context.len() + 1);
    out.extend_from_slice(context);
    out.push(bit as u8);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn proves_edge_values() {
        for value in [0u64, 1, 7, u64::MAX] {
            let (proof, r) = RangeProof::prove(value, b"ctx", &mut OsRng).unwrap();
            let c = generators().commit_value(value, &r);
            proof.verify(&c, b"ctx").unwrap();
        }
    }

    #[test]
    fn wrong_value_commitment_rejected() {
        let (proof, r) = RangeProof::prove(10, b"ctx", &mut OsRng).unwrap();
        let c = generators().commit_value(11, &r);
        assert_eq!(proof.verify(&c, b"ctx"), Err(RangeProofError::AggregateMismatch));
    }

    #[test]
    fn corrupted_bit_reports_one_out_of_many() {
        let (mut proof, r) = RangeProof::prove(3, b"ctx", &mut OsRng).unwrap();
        proof.corrupt_bit(5);
        let c = generators().commit_value(3, &r);
        match proof.verify(&c, b"ctx") {
            Err(RangeProofError::BitProof { bit: 5, .. }) => {}
            other => panic!("expected BitProof at bit 5, got {:?}", other),
        }
    }

    #[test]
    fn context_mismatch_rejected() {
        let (proof, r) = RangeProof::prove(3, b"a", &mut OsRng).unwrap();
        let c = generators().commit_value(3, &r);
        assert!(proof.verify(&c, b"b").is_err());
    }
}
