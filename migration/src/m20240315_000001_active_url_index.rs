use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        match manager.get_database_backend() {
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
                // 同一个 original_url 最多只有一条未删除记录；
                // 并发写入者撞上这个约束时由存储层转换为 Existing
                conn.execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_urls_active_original_url \
                     ON urls (original_url) WHERE deleted = false",
                )
                .await?;
            }
            DatabaseBackend::MySql => {
                // MySQL 不支持部分索引，TEXT 列也无法直接建唯一索引，
                // 这里只依赖事务内的存在性检查
            }
            _ => {}
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        match manager.get_database_backend() {
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
                conn.execute_unprepared("DROP INDEX IF EXISTS idx_urls_active_original_url")
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }
}
