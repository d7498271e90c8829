//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Finscribe - Extract financial transactions from document text.
#[derive(Debug, Parser)]
#[command(name = "finscribe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "finscribe.toml", env = "FINSCRIBE_CONFIG")]
    pub config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract transactions, resuming a previous run if one exists
    Run(RunArgs),

    /// Show the progress recorded for an output file
    Status(StatusArgs),

    /// Show the record fields declared by the configured schema
    Fields,
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Directory of extracted `*.txt` files, or a JSON object mapping file name to text
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSON array of transactions
    #[arg(short, long, default_value = "transactions.json")]
    pub output: PathBuf,

    /// files_metadata.json from the download step, for source document links
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Discard previous results at the output path instead of resuming
    #[arg(long)]
    pub fresh: bool,
}

/// Arguments for the status command.
#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output JSON array of transactions
    #[arg(short, long, default_value = "transactions.json")]
    pub output: PathBuf,
}

impl Cli {
    /// Default tracing filter for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
