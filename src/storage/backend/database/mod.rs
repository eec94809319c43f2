//! SeaORM storage backend
//!
//! SQLite, MySQL/MariaDB 和 PostgreSQL 上的 `urls` 表。
//! 短码唯一性由数据库约束保证；PostgreSQL/SQLite 另有
//! `original_url WHERE deleted = false` 的部分唯一索引，关闭多写者的查重竞争。

mod connection;
mod converters;
pub mod retry;

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::{Result, ShortyError};
use crate::storage::Storage;
use crate::storage::models::{OwnedUrl, OwnerId, Shortened, StorageStats};
use crate::utils::CodeGenerator;
use migration::entities::url;

pub use connection::{connect_generic, connect_sqlite, infer_backend_from_url, run_migrations};
pub use converters::{model_to_record, new_active_model, owner_to_db};
use retry::{RetryPolicy, is_unique_violation};

/// 单次生成尝试的结果
enum Attempt {
    Existing(String),
    Created(String),
    Collision,
}

#[derive(Clone)]
pub struct RelationalStore {
    db: DatabaseConnection,
    backend_name: &'static str,
    generator: CodeGenerator,
    retry_policy: RetryPolicy,
    /// 单次读查询超时
    query_timeout_ms: u64,
}

impl RelationalStore {
    pub async fn connect(config: &StorageConfig, generator: CodeGenerator) -> Result<Self> {
        let database_url = config.database_url()?;
        let backend_name = infer_backend_from_url(database_url)?;

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(config, database_url, backend_name).await?
        };

        let mut store = Self::from_connection(
            db,
            backend_name,
            generator,
            RetryPolicy::from_config(config),
        );
        store.query_timeout_ms = config.timeout.max(1) * 1000;
        run_migrations(&store.db).await?;

        info!("{} storage initialized", backend_name.to_uppercase());
        Ok(store)
    }

    /// 使用已有连接（迁移需调用方自行执行）
    fn from_connection(
        db: DatabaseConnection,
        backend_name: &'static str,
        generator: CodeGenerator,
        retry_policy: RetryPolicy,
    ) -> Self {
        if backend_name == "mysql" {
            warn!("MySQL has no partial unique index; concurrent dedup relies on transactions only");
        }
        Self {
            db,
            backend_name,
            generator,
            retry_policy,
            query_timeout_ms: 30_000,
        }
    }

    async fn find_active<C: ConnectionTrait>(
        conn: &C,
        long_url: &str,
    ) -> std::result::Result<Option<String>, DbErr> {
        Ok(url::Entity::find()
            .filter(url::Column::OriginalUrl.eq(long_url))
            .filter(url::Column::Deleted.eq(false))
            .one(conn)
            .await?
            .map(|m| m.short_url))
    }

    /// 一个事务内：查重、生成、插入
    async fn try_create(
        &self,
        owner: i64,
        long_url: &str,
    ) -> std::result::Result<Attempt, DbErr> {
        let txn = self.db.begin().await?;

        if let Some(code) = Self::find_active(&txn, long_url).await? {
            txn.commit().await?;
            return Ok(Attempt::Existing(code));
        }

        let code = self.generator.generate();
        let model = new_active_model(owner, &code, long_url);

        match url::Entity::insert(model).exec(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(Attempt::Created(code))
            }
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await?;
                // 可能是并发写入者抢先映射了同一个 URL
                match Self::find_active(&self.db, long_url).await? {
                    Some(existing) => Ok(Attempt::Existing(existing)),
                    None => {
                        debug!("Short code collision on {}, retrying", code);
                        Ok(Attempt::Collision)
                    }
                }
            }
            Err(e) => {
                txn.rollback().await?;
                Err(e)
            }
        }
    }

    async fn max_of(&self, column: url::Column) -> Result<u64> {
        let db = &self.db;
        let max = retry::with_retry("max", self.retry_policy, || async move {
            url::Entity::find()
                .select_only()
                .column_as(column.max(), "max_value")
                .into_tuple::<Option<i64>>()
                .one(db)
                .await
        })
        .await?;

        Ok(max.flatten().unwrap_or(0).max(0) as u64)
    }
}

#[async_trait]
impl Storage for RelationalStore {
    async fn save(&self, owner: OwnerId, code: &str, long_url: &str) -> Result<()> {
        let model = new_active_model(owner_to_db(owner)?, code, long_url);

        let txn = self.db.begin().await?;
        if let Some(existing) = Self::find_active(&txn, long_url).await? {
            txn.rollback().await?;
            return Err(ShortyError::conflict(format!(
                "URL is already shortened as {}",
                existing
            )));
        }

        match url::Entity::insert(model).exec(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                txn.rollback().await?;
                Err(ShortyError::conflict(format!(
                    "Short code {} is already taken",
                    code
                )))
            }
            Err(e) => {
                txn.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn get_or_create_short_code(
        &self,
        owner: OwnerId,
        long_url: &str,
    ) -> Result<Shortened> {
        let owner = owner_to_db(owner)?;

        for _ in 0..self.generator.max_attempts() {
            let attempt = retry::with_retry("get_or_create", self.retry_policy, || {
                self.try_create(owner, long_url)
            })
            .await?;

            match attempt {
                Attempt::Existing(code) => return Ok(Shortened::Existing(code)),
                Attempt::Created(code) => {
                    debug!("Shortened {} -> {} for owner {}", long_url, code, owner);
                    return Ok(Shortened::Created(code));
                }
                Attempt::Collision => continue,
            }
        }

        Err(ShortyError::exhausted(format!(
            "No free short code after {} attempts",
            self.generator.max_attempts()
        )))
    }

    async fn resolve(&self, code: &str) -> Result<String> {
        let db = &self.db;
        let model = retry::with_retry_timeout(
            "resolve",
            self.retry_policy,
            self.query_timeout_ms,
            || async move {
                url::Entity::find()
                    .filter(url::Column::ShortUrl.eq(code))
                    .one(db)
                    .await
            },
        )
        .await?;

        match model {
            Some(m) if m.deleted => Err(ShortyError::gone(format!(
                "Short code {} was deleted",
                code
            ))),
            Some(m) => Ok(m.original_url),
            None => Err(ShortyError::not_found(format!(
                "Short code {} does not exist",
                code
            ))),
        }
    }

    async fn list_owned(&self, owner: OwnerId, base_addr: &str) -> Result<Vec<OwnedUrl>> {
        let owner = owner_to_db(owner)?;
        let db = &self.db;
        let models = retry::with_retry("list_owned", self.retry_policy, || async move {
            url::Entity::find()
                .filter(url::Column::UserId.eq(owner))
                .filter(url::Column::Deleted.eq(false))
                .order_by_asc(url::Column::SequenceId)
                .all(db)
                .await
        })
        .await?;

        Ok(models
            .into_iter()
            .map(model_to_record)
            .map(|r| OwnedUrl::from_record(&r, base_addr))
            .collect())
    }

    async fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(pairs.len());
        for (code, owner) in pairs {
            rows.push((code.as_str(), owner_to_db(*owner)?));
        }

        let db = &self.db;
        let rows = &rows;
        let affected = retry::with_retry("soft_delete", self.retry_policy, || async move {
            let txn = db.begin().await?;
            let mut affected = 0;
            for (code, owner) in rows {
                let result = url::Entity::update_many()
                    .col_expr(url::Column::Deleted, Expr::value(true))
                    .filter(url::Column::ShortUrl.eq(*code))
                    .filter(url::Column::UserId.eq(*owner))
                    .filter(url::Column::Deleted.eq(false))
                    .exec(&txn)
                    .await;
                match result {
                    Ok(r) => affected += r.rows_affected,
                    Err(e) => {
                        txn.rollback().await?;
                        return Err(e);
                    }
                }
            }
            txn.commit().await?;
            Ok(affected)
        })
        .await?;

        debug!("Soft-deleted {} of {} requested rows", affected, pairs.len());
        Ok(())
    }

    async fn recover_last_sequence(&self) -> Result<u64> {
        self.max_of(url::Column::SequenceId).await
    }

    async fn recover_last_owner(&self) -> Result<u64> {
        self.max_of(url::Column::UserId).await
    }

    async fn stats(&self) -> Result<StorageStats> {
        let urls = url::Entity::find()
            .filter(url::Column::Deleted.eq(false))
            .count(&self.db)
            .await?;

        let owners: Vec<i64> = url::Entity::find()
            .select_only()
            .column(url::Column::UserId)
            .distinct()
            .filter(url::Column::Deleted.eq(false))
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(StorageStats {
            urls,
            owners: owners.len() as u64,
        })
    }

    async fn is_ready(&self) -> bool {
        match self.db.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} ping failed: {}", self.backend_name, e);
                false
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "database"
    }
}
