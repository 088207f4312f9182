//! # Hashing Utilities
//!
//! Every hash in the ledger goes through this module. There are three jobs:
//!
//! - **Identifiers** ([`Hash`]): transaction IDs, token property IDs, block
//!   hashes. BLAKE3 for ledger-native structures, SHA-256 where a digest has
//!   to match an externally defined format (token history keys, vout hashes).
//!
//! - **Hash-to-scalar** ([`hash_to_scalar`]): Fiat–Shamir challenges and
//!   one-time key tweaks. SHA-512 output reduced mod ℓ, so the result is
//!   statistically uniform over the Ristretto scalar field.
//!
//! - **Hash-to-point** ([`hash_to_point`]): the `Hp(·)` used for key images and
//!   for deriving the independent Pedersen generators. Goes through
//!   Ristretto's Elligator map, so nobody knows the discrete log of the
//!   result relative to the basepoint.
//!
//! Every scalar/point derivation takes a domain tag. Two protocols hashing the
//! same bytes under different tags never collide.

use std::fmt;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// A 32-byte digest used as an identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash. Used as "no parent" and "empty tree".
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Byte hashes
// ---------------------------------------------------------------------------

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// BLAKE3 of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Instead of allocating a buffer to concatenate inputs, we feed them
/// sequentially into the hasher. Same result, less allocation.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// BLAKE3 in `derive_key` mode. The context string picks a different IV, so
/// cross-context collisions are impossible by construction.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Compute a binary Merkle root over leaf hashes (BLAKE3).
///
/// Odd levels duplicate their last node; a single leaf is paired with
/// itself. Empty input yields [`Hash::zero`].
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::zero();
    }

    let mut level: Vec<[u8; 32]> = leaves.iter().map(|h| h.0).collect();
    if level.len() == 1 {
        return Hash(blake3_hash_multi(&[&level[0], &level[0]]));
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                blake3_hash_multi(&[&pair[0], right])
            })
            .collect();
    }

    Hash(level[0])
}

// ---------------------------------------------------------------------------
// Curve hashes
// ---------------------------------------------------------------------------

/// Hash a domain tag and a sequence of byte strings to a scalar.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` produce
/// different scalars.
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Scalar::from_hash(hasher)
}

/// Hash a domain tag and bytes to a Ristretto point with unknown discrete log.
pub fn hash_to_point(domain: &[u8], data: &[u8]) -> RistrettoPoint {
    let mut input = Vec::with_capacity(domain.len() + data.len() + 8);
    input.extend_from_slice(&(domain.len() as u64).to_le_bytes());
    input.extend_from_slice(domain);
    input.extend_from_slice(data);
    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string. The canonical vector everyone should
        // have memorized by now.
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(sha256_array(b"").to_vec(), expected);
    }

    #[test]
    fn blake3_different_inputs() {
        assert_ne!(blake3_hash(b"cloak"), blake3_hash(b"Cloak"));
    }

    #[test]
    fn domain_separation() {
        let data = b"same data";
        assert_ne!(
            domain_separated_hash("context-a", data),
            domain_separated_hash("context-b", data)
        );
    }

    #[test]
    fn hash_hex_round_trip() {
        let h = Hash::new(blake3_hash(b"tx"));
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(Hash::from_hex("zz").is_err());
    }

    #[test]
    fn merkle_root_empty_and_single() {
        assert_eq!(merkle_root(&[]), Hash::zero());
        let leaf = Hash::new([7u8; 32]);
        assert_eq!(merkle_root(&[leaf]).0, blake3_hash_multi(&[&[7u8; 32], &[7u8; 32]]));
    }

    #[test]
    fn merkle_root_odd_count_duplicates_last() {
        let a = Hash::new([1u8; 32]);
        let b = Hash::new([2u8; 32]);
        let c = Hash::new([3u8; 32]);
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn hash_to_scalar_is_length_prefixed() {
        let x = hash_to_scalar(b"d", &[b"ab", b"c"]);
        let y = hash_to_scalar(b"d", &[b"a", b"bc"]);
        assert_ne!(x, y);
        assert_eq!(x, hash_to_scalar(b"d", &[b"ab", b"c"]));
    }

    #[test]
    fn hash_to_point_respects_domain() {
        let p = hash_to_point(b"one", b"data");
        let q = hash_to_point(b"two", b"data");
        assert_ne!(p, q);
        assert_ne!(p, RISTRETTO_BASEPOINT_POINT);
    }
}
