use clap::{Parser, Subcommand};

use crate::indexer::abi;

#[derive(Parser)]
#[command(name = "ctf-indexer")]
#[command(version = "0.1.0")]
#[command(about = "Prediction-market event indexer with a read API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "CTF_INDEXER_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Index the contract and serve the read API
    Run {
        /// Override chain.start_block
        #[arg(long)]
        from_block: Option<u64>,
        /// Index only, without the HTTP server
        #[arg(long)]
        no_api: bool,
    },
    /// Serve the read API over an existing store
    Serve,
    /// Apply database migrations
    Migrate,
    /// Print the indexed event signatures and their topic0 hashes
    Topics,
}

/// Lines printed by `topics`
pub fn topic_lines() -> Vec<String> {
    abi::event_signatures()
        .into_iter()
        .map(|(signature, topic)| format!("{topic}  {signature}"))
        .collect()
}
