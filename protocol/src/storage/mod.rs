//! # Storage Module
//!
//! Persistent state of the ledger and the read contract the transaction
//! engine verifies against.
//!
//! ## Architecture
//!
//! ```text
//! store.rs  : CommitmentStore / ChainRetriever traits and StoreError
//! keys.rs   : key layout of the single `ledger` tree, token history format
//! db.rs     : LedgerDb: sled persistence, atomic per-block commit
//! view.rs   : TxViewPoint: everything one block writes, grouped per token
//! block.rs  : shard blocks, header hash and tx root
//! chain.rs  : BlockChain: per-shard tips, parallel verification
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Block ──verify (rayon)──▶ TxViewPoint ──apply_view (one Batch)──▶ LedgerDb
//!   ▲                                                                  │
//!   └──────────── ShardSnapshot (CommitmentStore + ChainRetriever) ◀───┘
//! ```
//!
//! Commitment, serial-number and SND records are scoped by `(token ID,
//! shard)`. Token records, token history and transactions are global.

pub mod block;
pub mod chain;
pub mod db;
pub mod keys;
pub mod store;
pub mod view;

pub use block::{Block, BlockHeader};
pub use chain::{BlockChain, ChainError, ShardSnapshot};
pub use db::{HolderBalances, LedgerDb, UnspentTokenVout};
pub use store::{ChainRetriever, CommitmentStore, LedgerView, StoreError, StoreResult};
pub use view::{CoinView, TokenRecord, TxViewPoint};
