//! # Cryptographic Primitives
//!
//! The foundation of everything security-related in the ledger. Every hash,
//! every key derivation, every authorization signature flows through here.
//!
//! We deliberately chose boring, well-audited building blocks:
//!
//! - **Ristretto255** (curve25519-dalek) for coin keys, commitments and ring
//!   signatures. A prime-order group, so no cofactor surprises.
//! - **Ed25519** (ed25519-dalek) for token vin authorization.
//! - **BLAKE3** for identifiers, **SHA-2** where a format demands it and for
//!   wide hash-to-scalar reduction.
//!
//! The protocols built from these live in [`crate::privacy`].

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, hash_to_point, hash_to_scalar, sha256_array, Hash};
pub use keys::{AuthSignature, KeyError, KeySet, PaymentAddress};
