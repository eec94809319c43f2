//! shorty - URL shortener core
//!
//! Shortens long URLs into fixed-length codes and resolves them back, scoped
//! per submitting owner.
//!
//! # Features
//! - **cli**: Operator command-line interface (default)
//!
//! # Architecture
//! - `storage`: `Storage` trait with memory, log-file and SeaORM backends
//! - `services`: owner registry, asynchronous deletion pipeline and the
//!   `ShortenerService` facade
//! - `utils`: short-code generation and URL validation
//! - `config`: TOML + environment configuration
//! - `system`: logging and lifecycle (startup, shutdown)
//! - `interfaces`: user interfaces (CLI)

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
