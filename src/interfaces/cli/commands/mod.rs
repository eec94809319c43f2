//! CLI command implementations

mod config;
mod links;
mod maintenance;

pub use config::{config_generate, config_show};
pub use links::{batch_shorten, delete_links, list_links, resolve_link, shorten_links};
pub use maintenance::{compact_log, ping_storage, show_stats};
