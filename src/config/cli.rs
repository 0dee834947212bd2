//! Command-line arguments
//!
//! Flags override values read from the configuration file.

use std::path::PathBuf;

use clap::Parser;

/// Embedis interactive shell
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "embedis", version, about = "In-memory engine with Redis data-type semantics")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of databases
    #[arg(long)]
    pub databases: Option<usize>,

    /// Log level (debug, verbose, notice, warning)
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Active expiry sweeps per second
    #[arg(long)]
    pub hz: Option<u32>,

    /// Seed for the random generators
    #[arg(long)]
    pub seed: Option<u64>,

    /// Disable EVAL/EVALSHA
    #[arg(long)]
    pub no_scripting: bool,

    /// Print replies as raw RESP2 instead of redis-cli style
    #[arg(long)]
    pub resp: bool,
}
