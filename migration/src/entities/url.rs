//! `urls` 表实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "urls")]
pub struct Model {
    /// Monotonic record sequence, used to recover counters after restart
    #[sea_orm(primary_key)]
    pub sequence_id: i64,
    #[sea_orm(unique)]
    pub short_url: String,
    #[sea_orm(column_type = "Text")]
    pub original_url: String,
    pub user_id: i64,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
