//! User-facing interfaces over the shortener service

#[cfg(feature = "cli")]
pub mod cli;
