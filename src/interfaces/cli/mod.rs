//! CLI interface module
//!
//! Runs one operator command against the configured storage backend.

pub mod commands;

use std::fmt;
use std::time::Duration;

use crate::cli::{Commands, ConfigCommands};
use crate::config::StaticConfig;
use crate::errors::ShortyError;
use crate::services::ShortenerService;
use crate::system::lifetime::{graceful_shutdown, wait_for_signal};
use commands::{
    batch_shorten, compact_log, config_generate, config_show, delete_links, list_links,
    ping_storage, resolve_link, shorten_links, show_stats,
};

#[derive(Debug)]
pub enum CliError {
    StorageError(ShortyError),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(err) => format!("Storage error: {}", err),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(err) => err.format_colored(),
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<ShortyError> for CliError {
    fn from(err: ShortyError) -> Self {
        CliError::StorageError(err)
    }
}

/// Commands that do not need the service
pub async fn run_standalone_command(
    cmd: Commands,
    config: &StaticConfig,
) -> Result<(), CliError> {
    match cmd {
        Commands::Config { action } => match action {
            ConfigCommands::Generate { output_path, force } => {
                config_generate(output_path, force).await
            }
            ConfigCommands::Show => config_show(config),
        },
        Commands::Compact => compact_log(config),
        _ => Err(CliError::CommandError(
            "command requires an initialized service".to_string(),
        )),
    }
}

/// Run a CLI command against the service, then drain pending deletions.
/// Ctrl+C abandons the command but still drains what was accepted
pub async fn run_cli_command(
    cmd: Commands,
    service: &ShortenerService,
    grace: Duration,
) -> Result<(), CliError> {
    // delete 自己排空并打印结果
    let mut drains_itself = matches!(cmd, Commands::Delete { .. });

    let result = tokio::select! {
        result = dispatch(cmd, service, grace) => result,
        _ = wait_for_signal() => {
            drains_itself = false;
            Err(CliError::CommandError("interrupted".to_string()))
        }
    };

    if !drains_itself {
        graceful_shutdown(service, grace).await;
    }
    result
}

async fn dispatch(
    cmd: Commands,
    service: &ShortenerService,
    grace: Duration,
) -> Result<(), CliError> {
    match cmd {
        Commands::Shorten { urls, owner } => shorten_links(service, urls, owner).await,
        Commands::Resolve { short_code } => resolve_link(service, &short_code).await,
        Commands::Batch {
            file_path,
            owner,
            json,
        } => batch_shorten(service, &file_path, owner, json).await,
        Commands::List { owner } => list_links(service, owner).await,
        Commands::Delete { owner, short_codes } => {
            delete_links(service, owner, short_codes, grace).await
        }
        Commands::Stats { json } => show_stats(service, json).await,
        Commands::Ping => ping_storage(service).await,
        Commands::Compact | Commands::Config { .. } => Err(CliError::CommandError(
            "command does not use the service".to_string(),
        )),
    }
}
