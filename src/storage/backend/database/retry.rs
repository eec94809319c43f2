//! 数据库瞬时错误的重试
//!
//! 断线、死锁、SQLite BUSY 一类错误按指数退避重做整个操作；
//! 唯一约束冲突永远不重试，交给调用方换短码或映射为 Conflict。

use std::future::Future;
use std::ops::Deref;
use std::time::Duration;

use sea_orm::error::RuntimeErr;
use sea_orm::{DbErr, SqlErr};
use tracing::{debug, warn};

use crate::config::StorageConfig;

/// SQLite BUSY(5) / LOCKED(6) / BUSY_RECOVERY(261) / BUSY_SNAPSHOT(517)，
/// MySQL 死锁与锁等待超时，PostgreSQL 序列化失败与死锁
const TRANSIENT_CODES: &[&str] = &["5", "6", "261", "517", "1213", "1205", "40001", "40P01"];

/// PostgreSQL / MySQL / SQLite UNIQUE / SQLite PRIMARY KEY
const UNIQUE_CODES: &[&str] = &["23505", "1062", "2067", "1555"];

const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
];

fn runtime_err(err: &DbErr) -> Option<&RuntimeErr> {
    match err {
        DbErr::Exec(e) | DbErr::Query(e) => Some(e),
        _ => None,
    }
}

/// 驱动返回的原始错误码
fn driver_code(err: &RuntimeErr) -> Option<String> {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => sqlx_err
            .deref()
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned()),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

pub(crate) fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

fn is_transient_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|needle| msg.contains(needle))
}

/// 值得重做一次的错误：拿不到连接、断线、锁冲突
pub fn is_transient(err: &DbErr) -> bool {
    if is_unique_violation(err) {
        return false;
    }
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        _ => runtime_err(err).is_some_and(|e| {
            driver_code(e).is_some_and(|code| is_transient_code(&code))
                || is_transient_message(&e.to_string())
        }),
    }
}

/// 唯一约束冲突：短码已被占用，或该 URL 已有有效映射
pub fn is_unique_violation(err: &DbErr) -> bool {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return true;
    }
    runtime_err(err)
        .and_then(driver_code)
        .is_some_and(|code| UNIQUE_CODES.contains(&code.as_str()))
}

/// `storage.retry_*` 配置项
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 首次失败后最多再试几次
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// 第 `retry` 次重试前的等待：base * 2^(retry-1)，封顶后加 0-25% 抖动
    fn delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(32);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        let jitter = rand::random_range(0..=capped / 4);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// 重试直到成功、遇到非瞬时错误或次数用尽
pub async fn with_retry<T, F, Fut>(name: &str, policy: RetryPolicy, operation: F) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    run(name, policy, None, operation).await
}

/// 同 `with_retry`，但每次尝试限时 `timeout_ms`，超时也算瞬时失败
pub async fn with_retry_timeout<T, F, Fut>(
    name: &str,
    policy: RetryPolicy,
    timeout_ms: u64,
    operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    run(name, policy, Some(Duration::from_millis(timeout_ms)), operation).await
}

async fn run<T, F, Fut>(
    name: &str,
    policy: RetryPolicy,
    limit: Option<Duration>,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut retries = 0;
    loop {
        let (outcome, timed_out) = match limit {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => (result, false),
                Err(_) => (
                    Err(DbErr::Custom(format!(
                        "Operation '{}' timed out after {:?}",
                        name, limit
                    ))),
                    true,
                ),
            },
            None => (operation().await, false),
        };

        match outcome {
            Ok(value) => {
                if retries > 0 {
                    debug!("Operation '{}' succeeded after {} retries", name, retries);
                }
                return Ok(value);
            }
            Err(e) if (timed_out || is_transient(&e)) && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay(retries);
                warn!(
                    "Operation '{}' failed (retry {}/{}): {}; waiting {:?}",
                    name, retries, policy.max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!("Operation '{}' gave up after {} retries: {}", name, retries, e);
                return Err(e);
            }
        }
    }
}
