use std::sync::Arc;

use tracing::debug;

use crate::config::{StaticConfig, init_config};
use crate::errors::Result;
use crate::services::ShortenerService;
use crate::system::logging::init_logging;

pub struct StartupContext {
    pub config: Arc<StaticConfig>,
    pub service: ShortenerService,
    /// 必须存活到进程结束，否则缓冲中的日志会丢失
    pub log_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// 加载 .env 与配置、初始化日志，然后构建服务
pub async fn prepare_startup(config_path: Option<&str>) -> Result<StartupContext> {
    dotenvy::dotenv().ok();

    let config = init_config(config_path)?;
    let log_guard = init_logging(&config.logging);
    debug!("Configuration: {:?}", config);

    let service = ShortenerService::from_config(&config).await?;

    Ok(StartupContext {
        config,
        service,
        log_guard,
    })
}
