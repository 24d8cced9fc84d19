use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ledger-stats", about = "Leaderboards from a Ledger SQLite snapshot.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Safely snapshot a live ledger database using the SQLite backup API
    Snapshot {
        /// Path to the live ledger.sqlite in the world directory
        #[arg(long)]
        src: PathBuf,
        /// Path to write the snapshot
        #[arg(long, default_value = "ledger.sqlite")]
        dst: PathBuf,
    },
    /// Print stats computed from a snapshot
    Report {
        #[command(flatten)]
        overrides: Overrides,
        /// Output format (markdown for human-readable, json for programmatic use)
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
    },
    /// Print player stats parsed from server logs (plain or gzip'd)
    LogReport {
        /// Log files or directories of logs
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Row limit for each board
        #[arg(long, default_value_t = 5)]
        limit: i64,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
    },
    /// Serve cached stats over HTTP
    Serve {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Markdown,
    Json,
}

/// Command line values merged over the environment configuration.
#[derive(Debug, Default, Clone, clap::Args, Serialize)]
pub struct Overrides {
    /// Path to ledger SQLite snapshot
    #[arg(long = "db")]
    #[serde(rename = "ledger_db", skip_serializing_if = "Option::is_none")]
    pub ledger_db: Option<PathBuf>,
    /// Row limit for leaderboards
    #[arg(long = "limit")]
    #[serde(rename = "stats_limit", skip_serializing_if = "Option::is_none")]
    pub stats_limit: Option<i64>,
}
