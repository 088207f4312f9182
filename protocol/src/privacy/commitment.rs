//! # Pedersen Commitments over Ristretto
//!
//! A coin's ledger commitment binds everything that makes it unique:
//!
//! ```text
//! C = pk + v·Gv + snd·Gsnd + shard·Gshard + r·G
//! ```
//!
//! `G` is the Ristretto basepoint and carries the blinding factor `r`. The
//! other three generators come from hash-to-group, so nobody knows their
//! discrete logs relative to `G` or to each other.
//!
//! Balance proofs only care about `v` and `r`. Anyone holding the public
//! parts of a coin `(pk, snd)` and knowing its shard can strip `C` down to
//! its **value commitment**:
//!
//! ```text
//! C − pk − snd·Gsnd − shard·Gshard = v·Gv + r·G
//! ```
//!
//! Value commitments are additively homomorphic, which is the whole trick
//! behind the ring's aggregate column.

use std::sync::OnceLock;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use crate::config::ShardId;
use crate::crypto::hash::hash_to_point;

const GENERATOR_DOMAIN: &[u8] = b"cloak/pedersen-generator";

/// The four commitment bases.
#[derive(Clone, Debug)]
pub struct PedersenGens {
    /// Value base `Gv`.
    pub value: RistrettoPoint,
    /// Serial-number-derivator base `Gsnd`.
    pub snd: RistrettoPoint,
    /// Shard base `Gshard`.
    pub shard: RistrettoPoint,
    /// Blinding base `G`, the Ristretto basepoint.
    pub randomness: RistrettoPoint,
}

static GENERATORS: OnceLock<PedersenGens> = OnceLock::new();

/// Process-wide generators, derived on first use.
pub fn generators() -> &'static PedersenGens {
    GENERATORS.get_or_init(PedersenGens::derive)
}

impl PedersenGens {
    fn derive() -> Self {
        Self {
            value: hash_to_point(GENERATOR_DOMAIN, b"value"),
            snd: hash_to_point(GENERATOR_DOMAIN, b"snd"),
            shard: hash_to_point(GENERATOR_DOMAIN, b"shard"),
            randomness: RISTRETTO_BASEPOINT_POINT,
        }
    }

    /// `v·Gv + r·G`.
    pub fn commit_value(&self, value: u64, randomness: &Scalar) -> RistrettoPoint {
        Scalar::from(value) * self.value + randomness * self.randomness
    }

    /// Full ledger commitment of a coin.
    pub fn commit_coin(
        &self,
        public_key: &RistrettoPoint,
        value: u64,
        snd: &Scalar,
        shard_id: ShardId,
        randomness: &Scalar,
    ) -> RistrettoPoint {
        public_key + self.commit_value(value, randomness) + self.coin_tag(snd, shard_id)
    }

    /// Strip the key, SND and shard terms off a ledger commitment, leaving
    /// `v·Gv + r·G`.
    pub fn value_commitment(
        &self,
        commitment: &RistrettoPoint,
        public_key: &RistrettoPoint,
        snd: &Scalar,
        shard_id: ShardId,
    ) -> RistrettoPoint {
        commitment - public_key - self.coin_tag(snd, shard_id)
    }

    fn coin_tag(&self, snd: &Scalar, shard_id: ShardId) -> RistrettoPoint {
        snd * self.snd + Scalar::from(u64::from(shard_id)) * self.shard
    }
}
