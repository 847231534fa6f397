//! Configuration loading and resolution
//!
//! Bootstrap configuration is a single TOML file. Every section and field has a
//! built-in default, so a missing or partial file never prevents startup.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`RELDATE_*`, see [`TomlConfig::apply_env_overrides`])
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RELDATE_CONFIG";

/// Observed batch limit of the original item-list UI
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Observed number of items searched concurrently
pub const DEFAULT_ITEM_CONCURRENCY: usize = 3;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Aggregation engine settings (optional)
    #[serde(default)]
    pub engine: EngineSection,

    /// Outbound HTTP settings used by the built-in probes (optional)
    #[serde(default)]
    pub http: HttpSection,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Aggregation engine section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// `"consensus"` (query every source and vote) or `"first-hit"`
    /// (query in priority order, accept the first date)
    pub mode: String,

    /// Items processed concurrently per group
    pub item_concurrency: usize,

    /// Sources queried concurrently per item (consensus mode)
    pub source_concurrency: usize,

    /// Upper bound for a single probe step, in milliseconds
    pub step_timeout_ms: u64,

    /// Largest batch the shell accepts
    pub max_batch_size: usize,

    /// Progress event channel capacity
    pub event_buffer: usize,

    /// Enabled sources in priority order
    pub sources: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            mode: "consensus".to_string(),
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            source_concurrency: 3,
            step_timeout_ms: 15_000,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            event_buffer: 64,
            sources: vec![
                "steam".to_string(),
                "wikipedia".to_string(),
                "metacritic".to_string(),
            ],
        }
    }
}

/// Outbound HTTP section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Per-source request rate limit
    pub requests_per_second: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            user_agent: concat!("reldate-finder/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: 10_000,
            requests_per_second: 2,
        }
    }
}

impl TomlConfig {
    /// Apply `RELDATE_*` environment overrides on top of file values
    ///
    /// Unparseable numeric values are ignored with a warning so a typo in the
    /// environment degrades to the file/default value instead of aborting.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("RELDATE_MODE") {
            debug!(mode = %mode, "Mode overridden by environment");
            self.engine.mode = mode;
        }
        if let Some(v) = env_number::<usize>("RELDATE_ITEM_CONCURRENCY") {
            self.engine.item_concurrency = v;
        }
        if let Some(v) = env_number::<usize>("RELDATE_SOURCE_CONCURRENCY") {
            self.engine.source_concurrency = v;
        }
        if let Some(v) = env_number::<u64>("RELDATE_STEP_TIMEOUT_MS") {
            self.engine.step_timeout_ms = v;
        }
        if let Ok(level) = std::env::var("RELDATE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

/// Platform default config file location (`<config_dir>/reldate/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reldate").join("config.toml"))
}

/// Resolve which config file to read
///
/// Priority: explicit path → `RELDATE_CONFIG` → platform default (only if it exists).
/// Returns `None` when no file should be read.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Serialize config to a TOML file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load configuration following the full priority chain (minus CLI flags)
///
/// An explicitly named file (CLI or environment) must load; the platform
/// default file is optional and falls back to built-in defaults.
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_path.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some();

    let mut config = match resolve_config_path(cli_path) {
        Some(path) => match load_toml_config(&path) {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) if !explicit => {
                warn!("{}; using built-in defaults", e);
                TomlConfig::default()
            }
            Err(e) => return Err(e),
        },
        None => {
            debug!("No config file found, using built-in defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}
