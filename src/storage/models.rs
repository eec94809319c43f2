use serde::{Deserialize, Serialize};

use crate::errors::{Result, ShortyError};

/// 所有者 ID（会话派生）
pub type OwnerId = u64;

/// 单条短链接记录
///
/// `sequence_id` 由后端分配，只用于排序与启动恢复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_code: String,
    pub long_url: String,
    pub owner_id: OwnerId,
    pub deleted: bool,
    pub sequence_id: u64,
}

/// 面向所有者的列表投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUrl {
    pub short_url: String,
    pub original_url: String,
}

impl OwnedUrl {
    pub fn from_record(record: &UrlRecord, base_addr: &str) -> Self {
        Self {
            short_url: short_url(base_addr, &record.short_code),
            original_url: record.long_url.clone(),
        }
    }
}

/// Joins the public prefix and a code.
pub fn short_url(base_addr: &str, code: &str) -> String {
    format!("{}/{}", base_addr.trim_end_matches('/'), code)
}

/// 批量缩短的输入项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// 批量缩短中单项的结果；失败不影响同批其它项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub correlation_id: String,
    pub outcome: Result<BatchShortened>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchShortened {
    pub short_url: String,
    /// false when the URL was already mapped
    pub created: bool,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// 后端统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// 未删除记录数
    pub urls: u64,
    /// 拥有未删除记录的所有者数
    pub owners: u64,
}

/// `get_or_create_short_code` 的结果
///
/// `Existing` 是"软成功"：URL 已经映射过，调用方应按幂等成功处理，
/// 但需要能区分出来（对应 Conflict 信号）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    Created(String),
    Existing(String),
}

impl Shortened {
    pub fn code(&self) -> &str {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn into_code(self) -> String {
        match self {
            Shortened::Created(code) | Shortened::Existing(code) => code,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Shortened::Existing(_))
    }

    /// Error form of the conflict signal, for callers that branch on `Result`.
    pub fn into_result(self) -> Result<String> {
        match self {
            Shortened::Created(code) => Ok(code),
            Shortened::Existing(code) => Err(ShortyError::conflict(format!(
                "URL already shortened as {}",
                code
            ))),
        }
    }
}
