pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20240301_000001_create_urls;
mod m20240315_000001_active_url_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_urls::Migration),
            Box::new(m20240315_000001_active_url_index::Migration),
        ]
    }
}
