//! # reldate common library
//!
//! Shared code for the release-date finder crates:
//! - Error types
//! - Configuration loading (TOML bootstrap + environment overrides)
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
