//! Service layer
//!
//! 所有者注册表、删除管道以及组合二者与存储的门面，
//! 可在不同的接口（CLI、未来的 HTTP/RPC）之间共享。

pub mod deletion;
pub mod owner_registry;
mod shortener;

pub use deletion::{
    BackpressurePolicy, DeadLetter, DeletionPipeline, DeletionRequest, DrainReport,
    PipelineOptions, PipelineStats,
};
pub use owner_registry::{OwnerRegistry, Session};
pub use shortener::{ServiceStatus, ShortenOutcome, ShortenerService};
