// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cloak Ledger Node
//!
//! Entry point for the `cloak-node` binary. Parses CLI arguments, sets up
//! logging and metrics, then runs one ledger command against the data
//! directory:
//!
//! - `init`         : create the data directory, config and empty ledger
//! - `status`       : best height per shard, token count
//! - `verify-block` : verify a block file and connect it
//! - `tokens`       : list registered custom tokens
//! - `version`      : print build version information

mod cli;
mod logging;
mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use cloak_protocol::config::{LedgerConfig, ShardId, PROTOCOL_VERSION};
use cloak_protocol::storage::{Block, BlockChain, ChainError, LedgerDb, TokenRecord};

use cli::{CloakNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;

const CONFIG_FILE: &str = "config.json";
const LEDGER_DIR: &str = "ledger";

fn main() -> Result<()> {
    let cli = CloakNodeCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));
    let metrics = NodeMetrics::new().context("failed to register metrics")?;

    let outcome = match cli.command {
        Commands::Init(args) => init_node(&cli.data_dir, args),
        Commands::Status => status(&cli.data_dir, &metrics),
        Commands::VerifyBlock(args) => verify_block(&cli.data_dir, &args.file, &metrics),
        Commands::Tokens(args) => list_tokens(&cli.data_dir, args.holders),
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    if let Some(path) = &cli.metrics_out {
        let text = metrics.encode().context("failed to encode metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }
    outcome
}

/// Config from `data_dir/config.json`, or defaults rooted at `data_dir`.
fn load_config(data_dir: &Path) -> Result<LedgerConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let mut config = if path.exists() {
        LedgerConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))?
    } else {
        tracing::warn!(path = %path.display(), "no config file, using defaults");
        LedgerConfig::default()
    };
    config.data_dir = data_dir.to_path_buf();
    Ok(config)
}

fn open_chain(config: &LedgerConfig) -> Result<BlockChain> {
    let db_path = config.data_dir.join(LEDGER_DIR);
    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open ledger at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), shards = config.shard_count, "ledger opened");
    BlockChain::open(Arc::new(db), config.shard_count, config.verification_threads)
        .context("failed to load shard tips")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_node(data_dir: &Path, args: cli::InitArgs) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        anyhow::bail!("{} already exists, pass --force to overwrite", config_path.display());
    }
    let mut config = LedgerConfig {
        data_dir: data_dir.to_path_buf(),
        ..LedgerConfig::default()
    };
    if let Some(shard_count) = args.shard_count {
        config.shard_count = shard_count;
    }
    config.validate().context("invalid init settings")?;
    std::fs::write(&config_path, config.to_json()?)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let chain = open_chain(&config)?;
    chain.db().flush().context("failed to flush ledger")?;

    tracing::info!(
        data_dir = %data_dir.display(),
        shards = config.shard_count,
        ring_size = config.ring_size,
        "node initialized"
    );
    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Shards         : {}", config.shard_count);
    Ok(())
}

#[derive(Serialize)]
struct ShardStatus {
    shard: ShardId,
    best_height: Option<u64>,
}

#[derive(Serialize)]
struct StatusReport {
    protocol_version: &'static str,
    data_dir: PathBuf,
    shards: Vec<ShardStatus>,
    tokens: usize,
}

fn status(data_dir: &Path, metrics: &NodeMetrics) -> Result<()> {
    let config = load_config(data_dir)?;
    let chain = open_chain(&config)?;

    let mut shards = Vec::with_capacity(chain.shard_count());
    for shard in 0..chain.shard_count() {
        let shard = shard as ShardId;
        let best_height = chain.best_height(shard)?;
        if let Some(height) = best_height {
            metrics.record_height(shard, height);
        }
        shards.push(ShardStatus { shard, best_height });
    }
    let tokens = chain.db().tokens().context("failed to list tokens")?.len();

    print_json(&StatusReport {
        protocol_version: PROTOCOL_VERSION,
        data_dir: config.data_dir,
        shards,
        tokens,
    })
}

fn rejection_reason(err: &ChainError) -> &'static str {
    match err {
        ChainError::InvalidBlock(_) => "invalid_block",
        ChainError::UnknownShard(_) => "unknown_shard",
        ChainError::HeightMismatch { .. } => "height",
        ChainError::ParentMismatch { .. } => "parent",
        ChainError::Transaction { .. } | ChainError::Tx(_) => "transaction",
        ChainError::Store(_) => "store",
        ChainError::ThreadPool(_) => "thread_pool",
    }
}

#[derive(Serialize)]
struct ConnectReport {
    shard: ShardId,
    height: u64,
    hash: String,
    transactions: usize,
    elapsed_ms: u128,
}

fn verify_block(data_dir: &Path, file: &Path, metrics: &NodeMetrics) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let block: Block = bincode::deserialize(&bytes)
        .with_context(|| format!("{} is not a bincode block", file.display()))?;

    let config = load_config(data_dir)?;
    let chain = open_chain(&config)?;

    let started = Instant::now();
    let timer = metrics.verification_latency_seconds.start_timer();
    let result = chain.connect_block(&block);
    timer.observe_duration();

    match result {
        Ok(()) => {
            metrics.blocks_connected_total.inc();
            metrics.transactions_verified_total.inc_by(block.tx_count() as u64);
            metrics.record_height(block.shard_id(), block.height());
            print_json(&ConnectReport {
                shard: block.shard_id(),
                height: block.height(),
                hash: block.header.hash.to_string(),
                transactions: block.tx_count(),
                elapsed_ms: started.elapsed().as_millis(),
            })
        }
        Err(err) => {
            metrics
                .blocks_rejected_total
                .with_label_values(&[rejection_reason(&err)])
                .inc();
            metrics.transactions_rejected_total.inc_by(block.tx_count() as u64);
            tracing::warn!(
                shard = block.shard_id(),
                height = block.height(),
                error = %err,
                "block rejected"
            );
            Err(err).with_context(|| {
                format!("block {} of shard {} rejected", block.height(), block.shard_id())
            })
        }
    }
}

#[derive(Serialize)]
struct TokenListing {
    #[serde(flatten)]
    record: TokenRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    holders: Option<cloak_protocol::storage::HolderBalances>,
}

fn list_tokens(data_dir: &Path, holders: bool) -> Result<()> {
    let config = load_config(data_dir)?;
    let chain = open_chain(&config)?;
    let db = chain.db();

    let mut listings = Vec::new();
    for record in db.tokens().context("failed to list tokens")? {
        let holders = if holders && !record.privacy {
            Some(db.token_holders(&record.property_id)?)
        } else {
            None
        };
        listings.push(TokenListing { record, holders });
    }
    print_json(&listings)
}

fn print_version() {
    println!("cloak-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
}
