use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::table::Table;
use crate::errors::Result;
use crate::storage::models::{OwnedUrl, OwnerId, Shortened, StorageStats};
use crate::storage::Storage;
use crate::utils::CodeGenerator;

/// 纯内存存储，进程退出即丢失
pub struct TableStore {
    table: RwLock<Table>,
    generator: CodeGenerator,
}

impl TableStore {
    pub fn new(generator: CodeGenerator) -> Self {
        info!(
            "TableStore initialized (code length {})",
            generator.length()
        );
        Self {
            table: RwLock::new(Table::new()),
            generator,
        }
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new(CodeGenerator::default())
    }
}

#[async_trait]
impl Storage for TableStore {
    async fn save(&self, owner: OwnerId, code: &str, long_url: &str) -> Result<()> {
        let mut table = self.table.write();
        table.check_vacant(code, long_url)?;
        let record = table.next_record(owner, code, long_url);
        table.apply(record);
        Ok(())
    }

    async fn get_or_create_short_code(
        &self,
        owner: OwnerId,
        long_url: &str,
    ) -> Result<Shortened> {
        let mut table = self.table.write();
        if let Some(code) = table.find_active(long_url) {
            return Ok(Shortened::Existing(code.to_string()));
        }

        let code = table.vacant_code(&self.generator)?;
        let record = table.next_record(owner, &code, long_url);
        table.apply(record);
        debug!("Shortened {} -> {} for owner {}", long_url, code, owner);
        Ok(Shortened::Created(code))
    }

    async fn resolve(&self, code: &str) -> Result<String> {
        self.table.read().resolve(code)
    }

    async fn list_owned(&self, owner: OwnerId, base_addr: &str) -> Result<Vec<OwnedUrl>> {
        Ok(self.table.read().list_owned(owner, base_addr))
    }

    async fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()> {
        let mut table = self.table.write();
        for tombstone in table.tombstones_for(pairs) {
            debug!("Soft-deleted {}", tombstone.short_code);
            table.apply(tombstone);
        }
        Ok(())
    }

    async fn recover_last_sequence(&self) -> Result<u64> {
        Ok(self.table.read().last_sequence())
    }

    async fn recover_last_owner(&self) -> Result<u64> {
        Ok(self.table.read().last_owner())
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(self.table.read().stats())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
