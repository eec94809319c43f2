use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{Result, ShortyError};
use crate::utils::CodeGenerator;
use crate::utils::url_validator::validate_url;

pub mod backend;
pub mod models;

pub use backend::{CompactReport, LogStore, RelationalStore, TableStore};
pub use models::{
    BatchItem, BatchResult, BatchShortened, OwnedUrl, OwnerId, Shortened, StorageStats,
    UrlRecord, short_url,
};

/// 持久化能力接口，三个后端互斥，每个进程只启用一个
#[async_trait]
pub trait Storage: Send + Sync {
    /// 以指定短码保存。短码已被占用（包括墓碑）或 URL 已有有效映射时返回 Conflict
    async fn save(&self, owner: OwnerId, code: &str, long_url: &str) -> Result<()>;

    /// 查重后生成短码；检查与写入是原子的
    async fn get_or_create_short_code(&self, owner: OwnerId, long_url: &str)
    -> Result<Shortened>;

    /// Gone for tombstones, NotFound for anything never stored
    async fn resolve(&self, code: &str) -> Result<String>;

    /// 批量缩短，逐项隔离：单项失败不影响其它项
    async fn resolve_batch(
        &self,
        owner: OwnerId,
        base_addr: &str,
        items: &[BatchItem],
    ) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let outcome = match validate_url(&item.original_url) {
                Ok(()) => self
                    .get_or_create_short_code(owner, item.original_url.trim())
                    .await
                    .map(|shortened| BatchShortened {
                        short_url: short_url(base_addr, shortened.code()),
                        created: !shortened.is_conflict(),
                    }),
                Err(e) => Err(e.into()),
            };
            results.push(BatchResult {
                correlation_id: item.correlation_id.clone(),
                outcome,
            });
        }
        results
    }

    /// 所有者的有效记录，按创建顺序；不含墓碑
    async fn list_owned(&self, owner: OwnerId, base_addr: &str) -> Result<Vec<OwnedUrl>>;

    /// 把匹配 (code, owner) 的记录标记为删除；不匹配的项静默忽略
    async fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()>;

    async fn recover_last_sequence(&self) -> Result<u64>;

    async fn recover_last_owner(&self) -> Result<u64>;

    async fn stats(&self) -> Result<StorageStats>;

    async fn is_ready(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
    Database,
}

impl StorageBackend {
    /// 按配置选择后端；未显式指定时：
    /// database_url -> Database，file_path -> File，否则 Memory
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if let Some(name) = config.backend.as_deref().filter(|b| !b.is_empty()) {
            return name.parse();
        }

        if config.database_url().is_ok() {
            Ok(StorageBackend::Database)
        } else if config.file_path().is_ok() {
            Ok(StorageBackend::File)
        } else {
            Ok(StorageBackend::Memory)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
            StorageBackend::Database => "database",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = ShortyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "table" => Ok(StorageBackend::Memory),
            "file" | "log" => Ok(StorageBackend::File),
            "database" | "db" | "sql" => Ok(StorageBackend::Database),
            other => Err(ShortyError::config(format!(
                "Unknown storage backend: {} (expected memory, file or database)",
                other
            ))),
        }
    }
}

pub struct StorageFactory;

impl StorageFactory {
    pub async fn create(
        config: &StorageConfig,
        generator: CodeGenerator,
    ) -> Result<Arc<dyn Storage>> {
        let backend = StorageBackend::from_config(config)?;
        info!("Using {} storage backend", backend);

        let boxed: Box<dyn Storage> = match backend {
            StorageBackend::Memory => Box::new(TableStore::new(generator)),
            StorageBackend::File => Box::new(LogStore::open(
                config.file_path()?,
                config.fsync,
                generator,
            )?),
            StorageBackend::Database => {
                Box::new(RelationalStore::connect(config, generator).await?)
            }
        };

        Ok(Arc::from(boxed))
    }
}
