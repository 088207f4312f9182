//! # Key Management
//!
//! A participant holds one 32-byte seed. Two keys come out of it:
//!
//! - a **spending key**, a Ristretto scalar. Privacy coins are locked to
//!   one-time public keys derived from it, and key images are computed
//!   from it.
//! - an **authorization key**, Ed25519. It signs custom-token vins.
//!
//! The public halves travel together as a [`PaymentAddress`].
//!
//! ## One-time coin keys
//!
//! ```text
//! tweak      = Hs("cloak/coin-key", snd)
//! coin_pk    = spend_pk + tweak·G
//! coin_sk    = spend_sk + tweak
//! key_image  = coin_sk · Hp(coin_pk)
//! ```
//!
//! Every coin carries a fresh SND, so every coin gets a distinct key and a
//! distinct key image, even when the same owner spends several coins in
//! one transaction. Only the owner knows `spend_sk`, so only the owner can
//! produce `coin_sk`.
//!
//! Key bytes are never logged. If you add logging to this module, you will
//! be asked to leave.

use std::fmt;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::{domain_separated_hash, hash_to_scalar};

const COIN_KEY_DOMAIN: &[u8] = b"cloak/coin-key";
const SPENDING_KEY_DOMAIN: &[u8] = b"cloak/spending-key";
const AUTH_KEY_CONTEXT: &str = "cloak 2026 authorization key";

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed. Leaking details about
/// key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid spend public key: not a valid Ristretto point")]
    InvalidSpendKey,

    #[error("invalid authorization key: not a valid Ed25519 point")]
    InvalidAuthKey,

    #[error("invalid payment address encoding")]
    InvalidEncoding,
}

/// Scalar tweak that turns an owner's spend key into a coin's one-time key.
pub fn coin_key_tweak(snd: &Scalar) -> Scalar {
    hash_to_scalar(COIN_KEY_DOMAIN, &[snd.as_bytes()])
}

// ---------------------------------------------------------------------------
// KeySet
// ---------------------------------------------------------------------------

/// The private key material of one participant.
///
/// Deliberately not `Serialize`. Persisting secrets should be a conscious
/// act through [`KeySet::from_seed`], not a side effect of dumping a struct.
pub struct KeySet {
    spending_key: Scalar,
    signing_key: SigningKey,
}

impl KeySet {
    /// Fresh keys from the OS RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Deterministic keys from a 32-byte seed. Same seed, same keys.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let spending_key = hash_to_scalar(SPENDING_KEY_DOMAIN, &[seed]);
        let signing_key = SigningKey::from_bytes(&domain_separated_hash(AUTH_KEY_CONTEXT, seed));
        Self {
            spending_key,
            signing_key,
        }
    }

    /// `spend_sk · G`.
    pub fn spend_public_key(&self) -> RistrettoPoint {
        self.spending_key * RISTRETTO_BASEPOINT_POINT
    }

    pub fn payment_address(&self) -> PaymentAddress {
        PaymentAddress {
            spend_key: self.spend_public_key().compress(),
            auth_key: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Private key of the coin with derivator `snd` owned by this key set.
    pub fn coin_secret(&self, snd: &Scalar) -> Scalar {
        self.spending_key + coin_key_tweak(snd)
    }

    /// Ed25519 signature with the authorization key.
    pub fn sign(&self, message: &[u8]) -> AuthSignature {
        AuthSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even "partially".
        write!(f, "KeySet(addr={})", self.payment_address())
    }
}

// ---------------------------------------------------------------------------
// PaymentAddress
// ---------------------------------------------------------------------------

/// Public half of a [`KeySet`]: where coins and tokens are sent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentAddress {
    /// Compressed `spend_sk · G`.
    pub spend_key: CompressedRistretto,
    /// Ed25519 verifying key bytes.
    pub auth_key: [u8; 32],
}

impl PaymentAddress {
    /// One-time public key of the coin with derivator `snd` sent to this
    /// address.
    pub fn coin_public_key(&self, snd: &Scalar) -> Result<RistrettoPoint, KeyError> {
        let spend = self
            .spend_key
            .decompress()
            .ok_or(KeyError::InvalidSpendKey)?;
        Ok(spend + coin_key_tweak(snd) * RISTRETTO_BASEPOINT_POINT)
    }

    /// Verify an authorization signature. A boolean, because every caller
    /// only wants yes or no.
    pub fn verify(&self, message: &[u8], signature: &AuthSignature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.auth_key) else {
            return false;
        };
        let Some(sig) = signature.to_dalek() else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }

    /// 64 bytes: spend key then authorization key.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.spend_key.as_bytes());
        out[32..].copy_from_slice(&self.auth_key);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 64 {
            return Err(KeyError::InvalidEncoding);
        }
        let spend_key =
            CompressedRistretto::from_slice(&bytes[..32]).map_err(|_| KeyError::InvalidEncoding)?;
        let mut auth_key = [0u8; 32];
        auth_key.copy_from_slice(&bytes[32..]);
        Ok(Self {
            spend_key,
            auth_key,
        })
    }

    /// Base58 of the spend key. This is the address component embedded in
    /// token history keys.
    pub fn spend_key_base58(&self) -> String {
        bs58::encode(self.spend_key.as_bytes()).into_string()
    }

    /// Base58 of the full 64-byte address.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for PaymentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for PaymentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.spend_key_base58();
        write!(f, "PaymentAddress({})", &encoded[..encoded.len().min(12)])
    }
}

// ---------------------------------------------------------------------------
// AuthSignature
// ---------------------------------------------------------------------------

/// An Ed25519 signature from an authorization key.
///
/// Stored as `Vec<u8>` for serde compatibility, but always 64 bytes when
/// produced by [`KeySet::sign`]. Anything else simply fails verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSignature {
    bytes: Vec<u8>,
}

impl AuthSignature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let arr: [u8; 64] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }
}

impl fmt::Debug for AuthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(&self.bytes);
        write!(f, "AuthSignature({})", &hex_str[..hex_str.len().min(16)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_seed_is_deterministic() {
        let a = KeySet::from_seed(&[9u8; 32]);
        let b = KeySet::from_seed(&[9u8; 32]);
        assert_eq!(a.payment_address(), b.payment_address());
        assert_ne!(
            a.payment_address(),
            KeySet::from_seed(&[10u8; 32]).payment_address()
        );
    }

    #[test]
    fn coin_secret_matches_coin_public_key() {
        let keys = KeySet::generate();
        let snd = Scalar::from(42u64);
        let pk = keys.payment_address().coin_public_key(&snd).unwrap();
        assert_eq!(keys.coin_secret(&snd) * RISTRETTO_BASEPOINT_POINT, pk);
    }

    #[test]
    fn distinct_snds_give_distinct_coin_keys() {
        let addr = KeySet::generate().payment_address();
        let a = addr.coin_public_key(&Scalar::from(1u64)).unwrap();
        let b = addr.coin_public_key(&Scalar::from(2u64)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn sign_and_verify() {
        let keys = KeySet::generate();
        let addr = keys.payment_address();
        let sig = keys.sign(b"vout hash");
        assert!(addr.verify(b"vout hash", &sig));
        assert!(!addr.verify(b"other", &sig));

        let stranger = KeySet::generate().payment_address();
        assert!(!stranger.verify(b"vout hash", &sig));
    }

    #[test]
    fn truncated_signature_fails_cleanly() {
        let addr = KeySet::generate().payment_address();
        let sig = AuthSignature { bytes: vec![0u8; 12] };
        assert!(!addr.verify(b"msg", &sig));
    }

    #[test]
    fn base58_round_trip() {
        let addr = KeySet::generate().payment_address();
        assert_eq!(PaymentAddress::from_base58(&addr.to_base58()).unwrap(), addr);
        assert!(PaymentAddress::from_base58("abc").is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let keys = KeySet::from_seed(&[1u8; 32]);
        let rendered = format!("{:?}", keys);
        assert!(rendered.starts_with("KeySet(addr="));
        assert!(!rendered.contains(&hex::encode(keys.spending_key.as_bytes())));
    }
}
