//! 短链接服务门面
//!
//! 持有一个存储后端、一个所有者注册表和一个删除管道，
//! 是传输层（HTTP、RPC、CLI）唯一需要持有的对象。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::StaticConfig;
use crate::errors::{Result, ShortyError};
use crate::services::deletion::{
    DeadLetter, DeletionPipeline, DeletionRequest, DrainReport, PipelineOptions, PipelineStats,
};
use crate::services::owner_registry::{OwnerRegistry, Session};
use crate::storage::{
    BatchItem, BatchResult, OwnedUrl, OwnerId, Storage, StorageFactory, StorageStats, short_url,
};
use crate::utils::{CodeGenerator, is_valid_code};
use crate::utils::url_validator::validate_url;

/// 一次缩短的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortenOutcome {
    pub code: String,
    pub short_url: String,
    /// false 表示该 URL 之前已被缩短（软成功）
    pub created: bool,
}

/// 健康检查与统计的汇总
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub backend: &'static str,
    pub ready: bool,
    pub storage: StorageStats,
    pub deletion: PipelineStats,
    pub active_sessions: usize,
    pub last_owner: OwnerId,
}

pub struct ShortenerService {
    storage: Arc<dyn Storage>,
    registry: OwnerRegistry,
    pipeline: DeletionPipeline,
    base_addr: String,
}

impl ShortenerService {
    /// 按配置创建存储、恢复注册表并启动删除管道
    pub async fn from_config(config: &StaticConfig) -> Result<Self> {
        let generator = CodeGenerator::from_config(&config.shortcode);
        let storage = StorageFactory::create(&config.storage, generator).await?;
        let options = PipelineOptions::from_config(&config.deletion)?;
        Self::with_storage(storage, options, config.server.base_addr()).await
    }

    pub async fn with_storage(
        storage: Arc<dyn Storage>,
        options: PipelineOptions,
        base_addr: &str,
    ) -> Result<Self> {
        if !storage.is_ready().await {
            return Err(ShortyError::unavailable(format!(
                "{} storage is not ready",
                storage.backend_name()
            )));
        }

        let registry = OwnerRegistry::recover(&storage).await?;
        let pipeline = DeletionPipeline::start(Arc::clone(&storage), options);

        info!(
            "Shortener service ready on {} storage, base address {}",
            storage.backend_name(),
            base_addr
        );
        Ok(Self {
            storage,
            registry,
            pipeline,
            base_addr: base_addr.trim_end_matches('/').to_string(),
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.registry
    }

    pub fn base_addr(&self) -> &str {
        &self.base_addr
    }

    pub fn session(&self, token: Option<&str>) -> (Session, bool) {
        self.registry.session_for(token)
    }

    pub async fn shorten(&self, owner: OwnerId, long_url: &str) -> Result<ShortenOutcome> {
        validate_url(long_url)?;
        let shortened = self
            .storage
            .get_or_create_short_code(owner, long_url.trim())
            .await?;

        let created = !shortened.is_conflict();
        let code = shortened.into_code();
        debug!("shorten: owner={} code={} created={}", owner, code, created);
        Ok(ShortenOutcome {
            short_url: short_url(&self.base_addr, &code),
            code,
            created,
        })
    }

    /// 含非法字符或超长的短码直接按 NotFound 处理，不访问存储。
    /// 不按当前配置的长度过滤，修改长度前保存的短码仍可解析
    pub async fn resolve(&self, code: &str) -> Result<String> {
        if !is_valid_code(code) {
            return Err(ShortyError::not_found(format!(
                "Short code {} does not exist",
                code
            )));
        }
        self.storage.resolve(code).await
    }

    pub async fn shorten_batch(&self, owner: OwnerId, items: &[BatchItem]) -> Vec<BatchResult> {
        self.storage
            .resolve_batch(owner, &self.base_addr, items)
            .await
    }

    pub async fn list_owned(&self, owner: OwnerId) -> Result<Vec<OwnedUrl>> {
        self.storage.list_owned(owner, &self.base_addr).await
    }

    /// 异步删除：返回入队数量，实际删除由后台完成
    pub async fn delete(&self, owner: OwnerId, codes: Vec<String>) -> Result<usize> {
        self.pipeline.submit_many(owner, codes).await
    }

    pub async fn delete_one(&self, owner: OwnerId, code: &str) -> Result<()> {
        self.pipeline
            .submit(DeletionRequest::new(code, owner))
            .await
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.pipeline.dead_letters()
    }

    pub fn requeue_dead_letters(&self) -> Result<usize> {
        self.pipeline.requeue_dead_letters()
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            backend: self.storage.backend_name(),
            ready: self.storage.is_ready().await,
            storage: self.storage.stats().await?,
            deletion: self.pipeline.stats(),
            active_sessions: self.registry.active_sessions(),
            last_owner: self.registry.last_allocated(),
        })
    }

    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.pipeline.shutdown(grace).await
    }
}
