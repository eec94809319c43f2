//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for shorty using clap's derive macros.

use clap::{Parser, Subcommand};

/// shorty - URL shortener core with pluggable storage
#[derive(Parser)]
#[command(name = "shorty")]
#[command(version)]
#[command(about = "URL shortener core: memory, log-file and SQL storage", long_about = None)]
pub struct Cli {
    /// Configuration file (default: shorty.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Shorten one or more URLs
    ///
    /// Without --owner a fresh owner is allocated for this invocation.
    Shorten {
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,

        /// Submit as an existing owner id
        #[arg(long)]
        owner: Option<u64>,
    },

    /// Resolve a short code to its original URL
    Resolve {
        short_code: String,
    },

    /// Shorten a JSON batch: [{"correlation_id": "...", "original_url": "..."}]
    Batch {
        /// Input file path
        file_path: String,

        #[arg(long)]
        owner: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the URLs owned by an owner
    List {
        #[arg(long)]
        owner: u64,
    },

    /// Soft-delete short codes owned by an owner
    Delete {
        #[arg(long)]
        owner: u64,

        #[arg(required = true, num_args = 1..)]
        short_codes: Vec<String>,
    },

    /// Show storage statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the storage backend is reachable
    Ping,

    /// Rewrite the log file keeping one line per short code (file backend only)
    Compact,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Configuration management commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: shorty.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Commands {
    /// Commands that run without opening storage
    pub fn needs_storage(&self) -> bool {
        !matches!(self, Commands::Config { .. } | Commands::Compact)
    }
}
