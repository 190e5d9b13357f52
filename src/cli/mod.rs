pub mod app;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shardgate")]
#[command(about = "Inspect and exercise a sharded, replicated database topology")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print every database the topology would open and the replica odds
    Plan {
        #[arg(long)]
        config: PathBuf,
    },
    /// Build the topology on the in-memory driver and run request scopes
    Simulate {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 1000)]
        requests: usize,
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        /// Seed for reproducible replica selection
        #[arg(long)]
        seed: Option<u64>,
    },
}
