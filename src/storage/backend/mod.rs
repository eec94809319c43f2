//! Storage backends
//!
//! - `memory`: TableStore, 纯内存
//! - `file`: LogStore, 追加式 JSON 行日志 + 内存镜像
//! - `database`: RelationalStore, SeaORM

pub mod database;
pub mod log;
pub mod memory;
pub mod table;

pub use database::RelationalStore;
pub use log::{CompactReport, LogStore};
pub use memory::TableStore;
pub use table::Table;
