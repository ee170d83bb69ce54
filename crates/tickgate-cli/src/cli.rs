//! CLI argument definitions for tickgate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Latest quote for one or more symbols |
//! | `status` | Provider quota and availability snapshot |
//! | `cache` | Clear or sweep the quote cache |
//! | `providers` | List providers, or enable / disable one |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--home` | `TICKGATE_HOME` | Directory for durable state |
//! | `--store` | `TICKGATE_STORE` | Store backend (file, duckdb, memory) |
//! | `--attempts` | `1` | Providers tried per quote before the offline sample |
//! | `--timeout-ms` | `10000` | Per-provider request timeout |
//! | `--verbose` | `false` | Debug logging (overridden by `RUST_LOG`) |
//!
//! # Examples
//!
//! ```bash
//! tickgate quote AAPL MSFT --format table
//! tickgate status --pretty
//! tickgate providers disable polygon
//! tickgate cache clear
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Market-data quote gateway with quota accounting and offline fallback.
#[derive(Debug, Parser)]
#[command(
    name = "tickgate",
    author,
    version,
    about = "Market-data quote gateway",
    long_about = "tickgate fetches latest quotes from several market-data providers, \
tracking each provider's daily and per-minute quota, disabling providers that keep \
failing at the network level, caching answers for five minutes and falling back to \
clearly labelled sample data when nothing can be reached.\n\
\n\
Use 'tickgate <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Directory for durable state (defaults to TICKGATE_HOME, then ~/.tickgate).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Store backend (defaults to TICKGATE_STORE, then file).
    #[arg(long, global = true, value_enum)]
    pub store: Option<StoreChoice>,

    /// Providers tried per quote before serving the offline sample.
    #[arg(long, global = true, default_value_t = 1)]
    pub attempts: usize,

    /// Per-provider request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreChoice {
    File,
    Duckdb,
    Memory,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the latest quote for one or more symbols.
    ///
    /// Always answers: when no provider can be reached the quote is an
    /// offline sample with source "offline-sample" and a note.
    ///
    /// # Examples
    ///
    ///   tickgate quote AAPL
    ///   tickgate quote AAPL MSFT NVDA --format table
    ///   tickgate quote TSLA --deadline-ms 2000
    Quote(QuoteArgs),

    /// Show per-provider quota, availability and the firewall assessment.
    Status,

    /// Cache management commands.
    Cache(CacheArgs),

    /// List providers, or switch one on or off.
    Providers(ProvidersArgs),
}

/// Arguments for the `quote` command.
#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// One or more market symbols (e.g., AAPL, MSFT, BRK.B).
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// Give up on the provider after this many milliseconds (single symbol only).
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}

/// Arguments for the `cache` command group.
#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache management subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove every cached quote from memory and the durable store.
    Clear,
    /// Remove expired entries only.
    Sweep,
}

/// Arguments for the `providers` command group.
#[derive(Debug, Args)]
pub struct ProvidersArgs {
    #[command(subcommand)]
    pub command: Option<ProvidersCommand>,
}

#[derive(Debug, Subcommand)]
pub enum ProvidersCommand {
    /// List configured providers (default).
    List,
    /// Re-enable a provider, clearing any auto-disable window.
    Enable { name: String },
    /// Disable a provider until it is enabled again.
    Disable { name: String },
}
