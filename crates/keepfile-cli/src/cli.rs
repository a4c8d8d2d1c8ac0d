//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keepfile_persistence::{StoreConfig, DEFAULT_HISTORY_LIMIT};

/// Keepfile - crash-safe single-value storage
#[derive(Parser, Debug)]
#[command(name = "keepfile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of history entries kept per file
    #[arg(
        long,
        env = "KEEPFILE_HISTORY_LIMIT",
        default_value_t = DEFAULT_HISTORY_LIMIT,
        global = true
    )]
    pub history_limit: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replace the stored value
    Write {
        /// Path of the primary file
        path: PathBuf,

        /// JSON value to store ("-" or omitted reads stdin)
        value: Option<String>,
    },

    /// Print the stored value, rolling back to history if needed
    Read {
        /// Path of the primary file
        path: PathBuf,

        /// Print JSON on a single line
        #[arg(short, long)]
        compact: bool,

        /// JSON value printed when nothing usable is stored (default: {})
        #[arg(short, long)]
        fallback: Option<String>,
    },

    /// Remove the stored value and its history
    Delete {
        /// Path of the primary file
        path: PathBuf,
    },

    /// List history entries, newest first
    History {
        /// Path of the primary file
        path: PathBuf,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

/// Output format for the history command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Cli {
    /// Builds the store configuration from flags.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new().with_history_limit(self.history_limit)
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
