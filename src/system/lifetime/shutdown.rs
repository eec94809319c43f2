use std::time::Duration;

use tokio::signal;
use tracing::{error, warn};

use crate::services::{DrainReport, ShortenerService};

/// 等待 Ctrl+C；无法注册监听时永不返回
pub async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => warn!("Shutdown signal received, draining deletion queue..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// 排空删除管道后返回；超过宽限期的请求不再应用
pub async fn graceful_shutdown(service: &ShortenerService, grace: Duration) -> DrainReport {
    let report = service.shutdown(grace).await;
    if report.timed_out {
        warn!(
            "Shutdown grace period of {:?} elapsed with {} deletions unapplied",
            grace, report.unapplied
        );
    } else {
        warn!("Deletion queue drained, shutting down...");
    }
    report
}
