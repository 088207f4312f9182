//! One-out-of-many proof: knowledge of the discrete log (base `G`) of one
//! of `N` candidate points, without revealing which.
//!
//! Built as a Cramer–Damgård–Schoenmakers OR-composition of Schnorr proofs.
//! The prover simulates every branch it cannot open and splits the
//! Fiat–Shamir challenge so the one real branch absorbs the remainder:
//!
//! ```text
//! k ≠ ℓ:  pick c_k, z_k          A_k = z_k·G − c_k·Y_k
//! k = ℓ:  pick a                 A_ℓ = a·G
//!         c   = H(ctx, Y, A)
//!         c_ℓ = c − Σ_{k≠ℓ} c_k,  z_ℓ = a + c_ℓ·x
//! ```
//!
//! The proof is just `(c_k, z_k)` per branch. The verifier rebuilds every
//! `A_k` and checks the challenges sum to the transcript hash.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use thiserror::Error;

const TRANSCRIPT_DOMAIN: &[u8] = b"cloak/one-out-of-many";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OneOutOfManyError {
    #[error("no candidates")]
    EmptyCandidates,

    #[error("secret index {index} out of bounds for {count} candidates")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("witness does not open the candidate at the secret index")]
    WitnessMismatch,

    #[error("proof has {got} branches, expected {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("challenge split does not match transcript")]
    InvalidProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneOutOfManyProof {
    challenges: Vec<Scalar>,
    responses: Vec<Scalar>,
}

impl OneOutOfManyProof {
    pub fn prove<R: RngCore + CryptoRng>(
        candidates: &[RistrettoPoint],
        secret_index: usize,
        witness: &Scalar,
        context: &[u8],
        rng: &mut R,
    ) -> Result<Self, OneOutOfManyError> {
        if candidates.is_empty() {
            return Err(OneOutOfManyError::EmptyCandidates);
        }
        if secret_index >= candidates.len() {
            return Err(OneOutOfManyError::IndexOutOfBounds {
                index: secret_index,
                count: candidates.len(),
            });
        }
        if witness * RISTRETTO_BASEPOINT_POINT != candidates[secret_index] {
            return Err(OneOutOfManyError::WitnessMismatch);
        }

        let count = candidates.len();
        let mut challenges = vec![Scalar::ZERO; count];
        let mut responses = vec![Scalar::ZERO; count];
        let mut commitments = Vec::with_capacity(count);
        let nonce = Scalar::random(rng);

        for (k, candidate) in candidates.iter().enumerate() {
            if k == secret_index {
                commitments.push(nonce * RISTRETTO_BASEPOINT_POINT);
            } else {
                challenges[k] = Scalar::random(rng);
                responses[k] = Scalar::random(rng);
                commitments.push(responses[k] * RISTRETTO_BASEPOINT_POINT - challenges[k] * candidate);
            }
        }

        let total = transcript(context, candidates, &commitments);
        let simulated: Scalar = challenges.iter().sum();
        challenges[secret_index] = total - simulated;
        responses[secret_index] = nonce + challenges[secret_index] * witness;

        Ok(Self {
            challenges,
            responses,
        })
    }

    pub fn verify(
        &self,
        candidates: &[RistrettoPoint],
        context: &[u8],
    ) -> Result<(), OneOutOfManyError> {
        if candidates.is_empty() {
            return Err(OneOutOfManyError::EmptyCandidates);
        }
        if self.challenges.len() != candidates.len() || self.responses.len() != candidates.len() {
            return Err(OneOutOfManyError::LengthMismatch {
                expected: candidates.len(),
                got: self.challenges.len().min(self.responses.len()),
            });
        }

        let commitments: Vec<RistrettoPoint> = candidates
            .iter()
            .zip(self.challenges.iter().zip(&self.responses))
            .map(|(y, (c, z))| z * RISTRETTO_BASEPOINT_POINT - c * y)
            .collect();

        let total: Scalar = self.challenges.iter().sum();
        if transcript(context, candidates, &commitments) == total {
            Ok(())
        } else {
            Err(OneOutOfManyError::InvalidProof)
        }
    }

    /// Append the canonical encoding: branch count, then `(c_k, z_k)` pairs.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.challenges.len() as u32).to_be_bytes());
        for (c, z) in self.challenges.iter().zip(&self.responses) {
            out.extend_from_slice(c.as_bytes());
            out.extend_from_slice(z.as_bytes());
        }
    }

    /// Tamper with one response. Only for exercising failure paths.
    #[cfg(test)]
    pub(crate) fn corrupt(&mut self) {
        if let Some(z) = self.responses.first_mut() {
            *z += Scalar::ONE;
        }
    }
}

fn transcript(context: &[u8], candidates: &[RistrettoPoint], commitments: &[RistrettoPoint]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(TRANSCRIPT_DOMAIN);
    hasher.update((context.len() as u64).to_le_bytes());
    hasher.update(context);
    for point in candidates.iter().chain(commitments) {
        hasher.update(point.compress().as_bytes());
    }
    Scalar::from_hash(hasher)
}
