use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use shorty::cli::Cli;
use shorty::config::init_config;
use shorty::interfaces::cli::{CliError, run_cli_command, run_standalone_command};
use shorty::system::lifetime::prepare_startup;
use shorty::system::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CliError>() {
                Some(cli_err) => eprintln!("{}", cli_err.format_colored()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.command.needs_storage() {
        dotenvy::dotenv().ok();
        let config = init_config(cli.config.as_deref())
            .map_err(CliError::from)
            .context("failed to load configuration")?;
        let _log_guard = init_logging(&config.logging);
        run_standalone_command(cli.command, &config).await?;
        return Ok(());
    }

    let ctx = prepare_startup(cli.config.as_deref())
        .await
        .map_err(CliError::from)
        .context("failed to start shortener service")?;

    let grace = Duration::from_secs(ctx.config.deletion.drain_timeout_secs);
    run_cli_command(cli.command, &ctx.service, grace).await?;
    Ok(())
}
