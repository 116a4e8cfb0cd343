//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Workspace filesystem mirror with metadata extraction and search
#[derive(Parser, Debug)]
#[command(name = "quillfs")]
#[command(about = "Mirror markdown workspaces, extract metadata, and search them")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (applies to all commands)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Cache directory override
    #[arg(long, global = true, env = "QUILLFS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load one or more roots and print the mirrored tree
    Scan(ScanArgs),

    /// Search the mirrored files
    #[command(visible_alias = "s")]
    Search(SearchArgs),

    /// Print aggregate workspace statistics
    Stats(StatsArgs),

    /// List every tag with its owning files
    Tags(StatsArgs),

    /// Watch roots and stream change events
    Watch(WatchArgs),

    /// Inspect or clear the metadata cache
    Cache(CacheArgs),
}

/// Output format selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Root paths to load (directories or single files)
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,
}

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Root paths to load
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    /// Query words; prefix with `!` to exclude, `#` to match tags
    #[arg(required = true, last = true)]
    pub words: Vec<String>,
}

/// Arguments for the stats / tags commands
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Root paths to load
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,
}

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Root paths to load and watch
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    /// Use the polling watcher
    #[arg(long)]
    pub poll: bool,

    /// Polling stability threshold in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval: u64,
}

/// Arguments for the cache command
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache maintenance actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache location and counters after a scan
    Info {
        /// Root paths to load through the cache
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Delete every cache shard
    Clear,
}
