//! 内存表：TableStore 的全部状态，也是 LogStore 的内存镜像
//!
//! 本身不加锁，持有者负责用一把锁包住每次读写，
//! 这样"检查再插入"始终处于同一个临界区内。

use std::collections::{HashMap, HashSet};

use crate::errors::{Result, ShortyError};
use crate::storage::models::{OwnedUrl, OwnerId, StorageStats, UrlRecord};
use crate::utils::CodeGenerator;

#[derive(Debug, Default)]
pub struct Table {
    records: HashMap<String, UrlRecord>,
    /// long_url -> code，只索引未删除记录
    active_by_url: HashMap<String, String>,
    last_sequence: u64,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_active(&self, long_url: &str) -> Option<&str> {
        self.active_by_url.get(long_url).map(String::as_str)
    }

    /// `save` 的前置检查
    pub fn check_vacant(&self, code: &str, long_url: &str) -> Result<()> {
        if let Some(existing) = self.records.get(code) {
            return Err(ShortyError::conflict(if existing.deleted {
                format!("Short code {} belongs to a deleted URL", code)
            } else {
                format!("Short code {} is already taken", code)
            }));
        }
        if let Some(existing) = self.find_active(long_url) {
            return Err(ShortyError::conflict(format!(
                "URL is already shortened as {}",
                existing
            )));
        }
        Ok(())
    }

    /// 生成一个未被占用过的短码，最多尝试 `max_attempts` 次
    pub fn vacant_code(&self, generator: &CodeGenerator) -> Result<String> {
        for _ in 0..generator.max_attempts() {
            let candidate = generator.generate();
            if !self.records.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ShortyError::exhausted(format!(
            "No free short code after {} attempts",
            generator.max_attempts()
        )))
    }

    /// Builds the next record without inserting it.
    pub fn next_record(&self, owner: OwnerId, code: &str, long_url: &str) -> UrlRecord {
        UrlRecord {
            short_code: code.to_string(),
            long_url: long_url.to_string(),
            owner_id: owner,
            deleted: false,
            sequence_id: self.last_sequence + 1,
        }
    }

    /// 写入（或覆盖）一条记录并维护反向索引。日志重放也走这里，后写的行生效
    pub fn apply(&mut self, record: UrlRecord) {
        if let Some(previous) = self.records.get(&record.short_code)
            && !previous.deleted
            && self.active_by_url.get(&previous.long_url) == Some(&previous.short_code)
        {
            self.active_by_url.remove(&previous.long_url);
        }

        if !record.deleted {
            self.active_by_url
                .insert(record.long_url.clone(), record.short_code.clone());
        }

        self.last_sequence = self.last_sequence.max(record.sequence_id);
        self.records.insert(record.short_code.clone(), record);
    }

    pub fn resolve(&self, code: &str) -> Result<String> {
        match self.records.get(code) {
            Some(record) if record.deleted => {
                Err(ShortyError::gone(format!("Short code {} was deleted", code)))
            }
            Some(record) => Ok(record.long_url.clone()),
            None => Err(ShortyError::not_found(format!(
                "Short code {} does not exist",
                code
            ))),
        }
    }

    pub fn list_owned(&self, owner: OwnerId, base_addr: &str) -> Vec<OwnedUrl> {
        let mut owned: Vec<&UrlRecord> = self
            .records
            .values()
            .filter(|r| r.owner_id == owner && !r.deleted)
            .collect();
        owned.sort_by_key(|r| r.sequence_id);
        owned
            .into_iter()
            .map(|r| OwnedUrl::from_record(r, base_addr))
            .collect()
    }

    /// 返回应被标记删除的记录（已置 deleted），不修改表
    pub fn tombstones_for(&self, pairs: &HashMap<String, OwnerId>) -> Vec<UrlRecord> {
        pairs
            .iter()
            .filter_map(|(code, owner)| {
                self.records
                    .get(code)
                    .filter(|r| r.owner_id == *owner && !r.deleted)
            })
            .map(|r| UrlRecord {
                deleted: true,
                ..r.clone()
            })
            .collect()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn last_owner(&self) -> u64 {
        self.records.values().map(|r| r.owner_id).max().unwrap_or(0)
    }

    pub fn stats(&self) -> StorageStats {
        let owners: HashSet<OwnerId> = self
            .records
            .values()
            .filter(|r| !r.deleted)
            .map(|r| r.owner_id)
            .collect();
        StorageStats {
            urls: self.active_by_url.len() as u64,
            owners: owners.len() as u64,
        }
    }

    /// 按 sequence_id 排序的全部记录（含墓碑），用于日志压缩
    pub fn snapshot(&self) -> Vec<UrlRecord> {
        let mut all: Vec<UrlRecord> = self.records.values().cloned().collect();
        all.sort_by_key(|r| r.sequence_id);
        all
    }
}
