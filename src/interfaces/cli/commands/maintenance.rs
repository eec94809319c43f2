//! Storage maintenance commands

use colored::Colorize;

use crate::config::StaticConfig;
use crate::interfaces::cli::CliError;
use crate::services::ShortenerService;
use crate::storage::{LogStore, StorageBackend};
use crate::utils::CodeGenerator;

pub async fn show_stats(service: &ShortenerService, json: bool) -> Result<(), CliError> {
    let status = service.status().await?;

    if json {
        let out = serde_json::to_string_pretty(&status)
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", "Storage statistics:".bold().green());
    println!("  backend: {}", status.backend.cyan());
    println!("  urls:    {}", status.storage.urls.to_string().green());
    println!("  owners:  {}", status.storage.owners.to_string().green());
    println!("  last owner id: {}", status.last_owner);
    Ok(())
}

pub async fn ping_storage(service: &ShortenerService) -> Result<(), CliError> {
    let backend = service.storage().backend_name();
    if service.storage().is_ready().await {
        println!("{} {} storage is ready", "✓".bold().green(), backend);
        Ok(())
    } else {
        Err(CliError::CommandError(format!(
            "{} storage is not ready",
            backend
        )))
    }
}

/// 直接打开日志文件压缩，不经过服务
pub fn compact_log(config: &StaticConfig) -> Result<(), CliError> {
    let backend = StorageBackend::from_config(&config.storage)?;
    if backend != StorageBackend::File {
        return Err(CliError::CommandError(format!(
            "compact only applies to the file backend (configured: {})",
            backend
        )));
    }

    let store = LogStore::open(
        config.storage.file_path()?,
        config.storage.fsync,
        CodeGenerator::from_config(&config.shortcode),
    )?;
    let report = store.compact()?;

    println!(
        "{} Compacted {}: {} -> {} lines",
        "✓".bold().green(),
        store.path().display().to_string().blue(),
        report.lines_before,
        report.lines_after.to_string().green()
    );
    Ok(())
}
