// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cloak Protocol
//!
//! A sharded privacy ledger. Coins are Pedersen-style commitments stored
//! per `(token, shard)`; spending one reveals only a key image (the serial
//! number) and a ring signature over a set of decoys drawn from the same
//! ledger. Custom tokens come in two flavours: plain vin/vout tokens whose
//! history is public, and privacy tokens whose coins live in the commitment
//! ledger under their own property ID.
//!
//! ## Modules
//!
//! - **config**: protocol constants and the operator-facing `LedgerConfig`.
//! - **crypto**: hashes, hash-to-curve, key sets and payment addresses.
//! - **privacy**: generators, coins, MLSAG, one-out-of-many and range proofs.
//! - **transaction**: ring building, signing, and every transaction kind with
//!   its validation pipeline.
//! - **storage**: the commitment store contract, sled persistence, per-block
//!   views and the per-shard chain.
//! - **mempool**: fee-ordered pool with pool-layer double-spend detection.

pub mod config;
pub mod crypto;
pub mod mempool;
pub mod privacy;
pub mod storage;
pub mod transaction;
