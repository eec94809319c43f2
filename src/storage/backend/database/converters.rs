use crate::errors::{Result, ShortyError};
use crate::storage::models::{OwnerId, UrlRecord};
use migration::entities::url;

/// 将 Sea-ORM Model 转换为 UrlRecord
pub fn model_to_record(model: url::Model) -> UrlRecord {
    UrlRecord {
        short_code: model.short_url,
        long_url: model.original_url,
        owner_id: model.user_id.max(0) as OwnerId,
        deleted: model.deleted,
        sequence_id: model.sequence_id.max(0) as u64,
    }
}

/// 构造插入用的 ActiveModel，sequence_id 交给数据库自增
pub fn new_active_model(owner: i64, code: &str, long_url: &str) -> url::ActiveModel {
    use sea_orm::ActiveValue::*;

    url::ActiveModel {
        sequence_id: NotSet,
        short_url: Set(code.to_string()),
        original_url: Set(long_url.to_string()),
        user_id: Set(owner),
        deleted: Set(false),
    }
}

/// 数据库列是有符号 BIGINT
pub fn owner_to_db(owner: OwnerId) -> Result<i64> {
    i64::try_from(owner)
        .map_err(|_| ShortyError::validation(format!("Owner id {} is out of range", owner)))
}
