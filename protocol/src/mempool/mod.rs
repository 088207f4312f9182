//! Pending-transaction pool.
//!
//! Admission runs the full validation pipeline against a ledger view, plus
//! the pool-layer double-spend checks that only make sense against other
//! pending work.

pub mod pool;

pub use pool::{required_fee, PoolConfig, PoolEntry, TxPool};
