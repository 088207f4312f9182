//! # Privacy Primitives
//!
//! The cryptography behind confidential transfers, all over Ristretto255.
//!
//! ## Architecture
//!
//! ```text
//! commitment.rs   : Pedersen generators, coin and value commitments
//! coin.rs         : Coin (ledger record), InputCoin, OutputCoin, PaymentInfo
//! mlsag.rs        : linkable ring signature over an n×m key matrix
//! one_of_many.rs  : OR-proof of one known discrete log among N points
//! range.rs        : 64-bit range proof built from one-out-of-many bit proofs
//! proof.rs        : PaymentProof: per-output range proofs or openings
//! ```
//!
//! ## How the pieces fit
//!
//! ```text
//! inputs ──► ring builder ──► Ring ──┐
//!                                    ├──► MlsagSignature (ownership + balance)
//! payments ──► PaymentProof ─bytes───┘
//!                  │
//!                  └──► RangeProof ──► OneOutOfManyProof (per bit)
//! ```
//!
//! Ownership and balance come from the ring signature, whose last column
//! is `Σ inputs − fee − Σ outputs` and can only be signed when it is a pure
//! multiple of `G`. Output well-formedness comes from the payment proof.

pub mod coin;
pub mod commitment;
pub mod mlsag;
pub mod one_of_many;
pub mod proof;
pub mod range;

pub use coin::{Coin, InputCoin, OutputCoin, PaymentInfo};
pub use commitment::{generators, PedersenGens};
pub use mlsag::{key_image, MlsagError, MlsagSignature, Ring};
pub use one_of_many::{OneOutOfManyError, OneOutOfManyProof};
pub use proof::{Opening, PaymentProof, ProofContext, ProofFailure, ProveError};
pub use range::{RangeProof, RangeProofError};
