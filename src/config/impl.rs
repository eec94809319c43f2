use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;
use crate::errors::Result;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Initialize the global configuration
///
/// Loads configuration from `path` (or `shorty.toml` in the current
/// directory) overlaid by `SHORTY__*` environment variables. Only the first
/// successful call has an effect; a load error is returned and nothing is
/// stored.
///
/// # Examples
/// ```no_run
/// use shorty::config::init_config;
/// let config = init_config(None).expect("invalid configuration");
/// ```
pub fn init_config(path: Option<&str>) -> Result<Arc<StaticConfig>> {
    if let Some(config) = CONFIG.get() {
        return Ok(config.load_full());
    }
    let loaded = StaticConfig::load(path)?;
    Ok(CONFIG
        .get_or_init(|| ArcSwap::from_pointee(loaded))
        .load_full())
}
