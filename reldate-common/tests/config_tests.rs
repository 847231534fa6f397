//! Unit tests for configuration loading and graceful degradation
//!
//! Tests that manipulate `RELDATE_*` environment variables are marked with
//! #[serial] so they run sequentially, not in parallel.

use reldate_common::config::{
    load_config, load_toml_config, resolve_config_path, write_toml_config, EngineSection,
    LoggingConfig, TomlConfig, CONFIG_ENV_VAR,
};
use serial_test::serial;
use std::env;
use tempfile::TempDir;

fn clear_env() {
    for name in [
        CONFIG_ENV_VAR,
        "RELDATE_MODE",
        "RELDATE_ITEM_CONCURRENCY",
        "RELDATE_SOURCE_CONCURRENCY",
        "RELDATE_STEP_TIMEOUT_MS",
        "RELDATE_LOG_LEVEL",
    ] {
        env::remove_var(name);
    }
}

#[test]
fn test_defaults_match_observed_constants() {
    let config = TomlConfig::default();
    assert_eq!(config.engine.mode, "consensus");
    assert_eq!(config.engine.item_concurrency, 3);
    assert_eq!(config.engine.max_batch_size, 20);
    assert_eq!(config.engine.sources, vec!["steam", "wikipedia", "metacritic"]);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.file.is_none());
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[engine]\nmode = \"first-hit\"\nsources = [\"wikipedia\", \"steam\"]\n",
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.engine.mode, "first-hit");
    assert_eq!(config.engine.sources, vec!["wikipedia", "steam"]);
    // Untouched fields keep built-in defaults
    assert_eq!(config.engine.item_concurrency, 3);
    assert_eq!(config.engine.step_timeout_ms, 15_000);
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_write_then_load_preserves_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        engine: EngineSection {
            item_concurrency: 5,
            sources: vec!["metacritic".to_string()],
            ..EngineSection::default()
        },
        ..TomlConfig::default()
    };

    write_toml_config(&config, &path).unwrap();
    assert!(path.exists(), "parent directories should be created");
    assert_eq!(load_toml_config(&path).unwrap(), config);
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[engine\nmode = ").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
#[serial]
fn test_cli_path_beats_environment() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let cli = std::path::PathBuf::from("/from/cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));
    assert_eq!(
        resolve_config_path(None),
        Some(std::path::PathBuf::from("/from/env.toml"))
    );

    clear_env();
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    assert!(load_config(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_env_overrides_applied_after_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[engine]\nitem_concurrency = 2\nstep_timeout_ms = 500\n").unwrap();

    env::set_var("RELDATE_ITEM_CONCURRENCY", "7");
    env::set_var("RELDATE_STEP_TIMEOUT_MS", "not-a-number");
    env::set_var("RELDATE_MODE", "first-hit");

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.engine.item_concurrency, 7);
    assert_eq!(config.engine.step_timeout_ms, 500, "bad override ignored");
    assert_eq!(config.engine.mode, "first-hit");

    clear_env();
}
