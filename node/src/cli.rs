//! # CLI Interface
//!
//! Command-line structure for `cloak-node`, built with `clap` derive. Global
//! flags pick the data directory and logging; subcommands inspect or extend
//! the ledger stored there.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cloak ledger node.
///
/// Verifies and connects shard blocks into a local ledger, and answers
/// questions about the commitments and tokens it holds.
#[derive(Parser, Debug)]
#[command(
    name = "cloak-node",
    about = "Cloak ledger node",
    version,
    propagate_version = true
)]
pub struct CloakNodeCli {
    /// Directory holding `config.json` and the ledger database.
    #[arg(long, short = 'd', global = true, env = "CLOAK_DATA_DIR", default_value = "./cloak-data")]
    pub data_dir: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "CLOAK_LOG_LEVEL", default_value = "cloak_node=info,cloak_protocol=info")]
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "CLOAK_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Write the run's metrics here in Prometheus text format on exit.
    #[arg(long, global = true, env = "CLOAK_METRICS_OUT")]
    pub metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, a default `config.json` and an empty ledger.
    Init(InitArgs),
    /// Best height of every shard and the number of registered tokens.
    Status,
    /// Verify a bincode-encoded block and connect it to its shard.
    VerifyBlock(VerifyBlockArgs),
    /// List registered custom tokens.
    Tokens(TokensArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `config.json`.
    #[arg(long)]
    pub force: bool,

    /// Number of shards to track.
    #[arg(long)]
    pub shard_count: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct VerifyBlockArgs {
    /// Path to the block file.
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct TokensArgs {
    /// Also print unspent holder balances of each token.
    #[arg(long)]
    pub holders: bool,
}
