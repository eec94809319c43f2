pub mod shutdown;
pub mod startup;

pub use shutdown::{graceful_shutdown, wait_for_signal};
pub use startup::{StartupContext, prepare_startup};
