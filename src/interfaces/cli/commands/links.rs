//! Link commands: shorten, resolve, batch, list, delete

use std::time::Duration;

use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::services::ShortenerService;
use crate::storage::{BatchItem, OwnerId};

/// 未指定 owner 时为本次调用分配一个新会话
fn owner_or_new(service: &ShortenerService, owner: Option<OwnerId>) -> OwnerId {
    match owner {
        Some(owner) => owner,
        None => {
            let (session, _) = service.session(None);
            println!(
                "{} Allocated owner {}",
                "ℹ".bold().blue(),
                session.owner_id.to_string().magenta()
            );
            session.owner_id
        }
    }
}

pub async fn shorten_links(
    service: &ShortenerService,
    urls: Vec<String>,
    owner: Option<OwnerId>,
) -> Result<(), CliError> {
    let owner = owner_or_new(service, owner);
    let mut failed = 0;

    for url in &urls {
        match service.shorten(owner, url).await {
            Ok(outcome) if outcome.created => println!(
                "{} {} -> {}",
                "✓".bold().green(),
                outcome.short_url.cyan(),
                url.blue().underline()
            ),
            Ok(outcome) => println!(
                "{} {} -> {} {}",
                "=".bold().yellow(),
                outcome.short_url.cyan(),
                url.blue().underline(),
                "(already shortened)".dimmed()
            ),
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "✗".bold().red(), url, e.format_simple());
            }
        }
    }

    if failed > 0 {
        return Err(CliError::CommandError(format!(
            "{} of {} URLs failed",
            failed,
            urls.len()
        )));
    }
    Ok(())
}

pub async fn resolve_link(service: &ShortenerService, code: &str) -> Result<(), CliError> {
    let target = service.resolve(code).await?;
    println!("{} -> {}", code.cyan(), target.blue().underline());
    Ok(())
}

pub async fn batch_shorten(
    service: &ShortenerService,
    file_path: &str,
    owner: Option<OwnerId>,
    json: bool,
) -> Result<(), CliError> {
    let content = std::fs::read_to_string(file_path)
        .map_err(|e| CliError::ParseError(format!("Cannot read {}: {}", file_path, e)))?;
    let items: Vec<BatchItem> = serde_json::from_str(&content)
        .map_err(|e| CliError::ParseError(format!("Invalid batch file {}: {}", file_path, e)))?;

    let owner = owner_or_new(service, owner);
    let results = service.shorten_batch(owner, &items).await;

    if json {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|r| match &r.outcome {
                Ok(ok) => serde_json::json!({
                    "correlation_id": r.correlation_id,
                    "short_url": ok.short_url,
                    "created": ok.created,
                }),
                Err(e) => serde_json::json!({
                    "correlation_id": r.correlation_id,
                    "error": e.message(),
                    "code": e.code(),
                }),
            })
            .collect();
        let out = serde_json::to_string_pretty(&rows)
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    let ok = results.iter().filter(|r| r.is_ok()).count();
    for result in &results {
        match &result.outcome {
            Ok(shortened) => println!(
                "  {} {} -> {}",
                "✓".bold().green(),
                result.correlation_id.dimmed(),
                shortened.short_url.cyan()
            ),
            Err(e) => println!(
                "  {} {} {}",
                "✗".bold().red(),
                result.correlation_id.dimmed(),
                e.format_simple().red()
            ),
        }
    }
    println!();
    println!(
        "{} {} succeeded, {} failed",
        "ℹ".bold().blue(),
        ok.to_string().green(),
        (results.len() - ok).to_string().red()
    );
    Ok(())
}

pub async fn list_links(service: &ShortenerService, owner: OwnerId) -> Result<(), CliError> {
    let links = service.list_owned(owner).await?;

    if links.is_empty() {
        println!("{} No short links for owner {}", "ℹ".bold().blue(), owner);
    } else {
        println!("{}", format!("Short links of owner {}:", owner).bold().green());
        println!();
        for link in &links {
            println!(
                "  {} -> {}",
                link.short_url.cyan(),
                link.original_url.blue().underline()
            );
        }
        println!();
        println!(
            "{} Total {} short links",
            "ℹ".bold().blue(),
            links.len().to_string().green()
        );
    }
    Ok(())
}

/// 提交删除并等待管道排空，打印未能应用的请求
pub async fn delete_links(
    service: &ShortenerService,
    owner: OwnerId,
    codes: Vec<String>,
    grace: Duration,
) -> Result<(), CliError> {
    let accepted = service.delete(owner, codes).await?;
    println!(
        "{} Accepted {} deletions, waiting for them to apply...",
        "ℹ".bold().blue(),
        accepted
    );

    let report = crate::system::lifetime::graceful_shutdown(service, grace).await;
    let dead = service.dead_letters();

    for letter in &dead {
        println!(
            "  {} {} ({} attempts): {}",
            "✗".bold().red(),
            letter.request.short_code.cyan(),
            letter.attempts,
            letter.error
        );
    }

    if report.unapplied > 0 || !dead.is_empty() {
        return Err(CliError::CommandError(format!(
            "{} deletions unapplied, {} failed",
            report.unapplied,
            dead.len()
        )));
    }

    println!("{} Deletions applied", "✓".bold().green());
    Ok(())
}
