//! # Protocol Configuration & Constants
//!
//! Every magic number in the ledger lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! The first half of this file is consensus: ring dimensions, proof sizes,
//! the legacy verification cutoff, and the on-disk key conventions. Changing
//! any of those after launch forks the chain. The second half is
//! [`LedgerConfig`], the operator-tunable knobs a node reads from JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Transaction format version stamped into every privacy transaction.
pub const TX_VERSION: u8 = 2;

/// Crate version string for CLI output and logs.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Shards
// ---------------------------------------------------------------------------

/// Shard identifier. One byte on the wire, one lock in the coordinator.
pub type ShardId = u8;

/// Default number of shards the ledger is partitioned into.
pub const SHARD_COUNT: usize = 8;

// ---------------------------------------------------------------------------
// Ring Parameters
// ---------------------------------------------------------------------------

/// Anonymity set size used when privacy is enabled. With privacy disabled
/// the ring always has exactly one row.
pub const RING_SIZE: usize = 8;

/// Upper bound for both ring dimensions. The proof-of-ring header stores the
/// row and column counts as one byte each.
pub const MAX_RING_DIMENSION: usize = 255;

/// Cap on resampling attempts per decoy cell before ring construction gives
/// up. Large enough that a healthy commitment pool never hits it.
pub const MAX_DECOY_ATTEMPTS: usize = 1_000;

/// Number of bits covered by an output range proof.
pub const RANGE_PROOF_BITS: usize = 64;

/// Unix timestamp (seconds) at or before which historical transactions may
/// pass verification on their ring signature alone when the only failing
/// proof component is a one-out-of-many proof. New transactions never get
/// this treatment.
pub const ONE_OUT_OF_MANY_CUTOFF: u64 = 1_574_985_600;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Token ID of the native coin. Custom tokens are keyed by their property ID.
pub const NATIVE_TOKEN_ID: Hash = Hash::new([0x04; 32]);

/// Maximum length in bytes of a custom token's name or symbol.
pub const MAX_TOKEN_NAME_LENGTH: usize = 64;

/// Vouts per custom-token transaction. History keys hold the vout index in
/// one byte.
pub const MAX_TOKEN_VOUTS: usize = 256;

/// Key prefix of the custom-token payment-address history.
pub const TOKEN_HISTORY_PREFIX: &str = "token-paymentaddress";

/// Separator between the components of a history key or value.
pub const KEY_DELIMITER: &str = "-[-]-";

pub const SPENT: &str = "spent";
pub const UNSPENT: &str = "unspent";
pub const REWARDED: &str = "rewarded";
pub const UNREWARDED: &str = "unrewarded";

/// Token holder balances are snapshotted every this many blocks so reward
/// distribution can be computed against a stable view.
pub const REWARD_SNAPSHOT_INTERVAL: u64 = 1_000;

// ---------------------------------------------------------------------------
// Fees & Pool
// ---------------------------------------------------------------------------

/// Default minimum fee per started kilobyte of serialized transaction.
pub const DEFAULT_MIN_FEE_PER_KB: u64 = 1;

/// Default maximum number of pending transactions in the pool.
pub const DEFAULT_POOL_MAX_SIZE: usize = 10_000;

/// Maximum size of a transaction's free-form `info` field.
pub const MAX_TX_INFO_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`LedgerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Operator-tunable ledger settings.
///
/// Everything here is local policy. Two nodes with different values still
/// agree on which blocks are valid; they only differ in what their pools
/// admit and how hard they work doing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the sled database.
    pub data_dir: PathBuf,
    /// Number of shards this node tracks.
    pub shard_count: usize,
    /// Ring size used when building private transactions.
    pub ring_size: usize,
    /// Pool admission fee floor per started kilobyte.
    pub min_fee_per_kb: u64,
    /// Maximum number of pending pool transactions.
    pub pool_max_size: usize,
    /// Worker threads for block verification. Zero lets rayon decide.
    pub verification_threads: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            shard_count: SHARD_COUNT,
            ring_size: RING_SIZE,
            min_fee_per_kb: DEFAULT_MIN_FEE_PER_KB,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            verification_threads: 0,
        }
    }
}

impl LedgerConfig {
    /// Read a JSON config file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the protocol cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_size == 0 || self.ring_size > MAX_RING_DIMENSION {
            return Err(ConfigError::Invalid(format!(
                "ring_size must be in 1..={MAX_RING_DIMENSION}, got {}",
                self.ring_size
            )));
        }
        if self.shard_count == 0 || self.shard_count > 256 {
            return Err(ConfigError::Invalid(format!(
                "shard_count must be in 1..=256, got {}",
                self.shard_count
            )));
        }
        if self.pool_max_size == 0 {
            return Err(ConfigError::Invalid("pool_max_size must be positive".into()));
        }
        Ok(())
    }

    /// Pretty JSON rendering, used by `cloak-node init`.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
