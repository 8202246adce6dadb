//! Configuration file loading with precedence handling.

use super::EngineConfig;
use crate::model::VisibilityMode;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "LAZY_TURNS_CONFIG";

/// Environment variable overriding the visibility mode.
pub const MODE_ENV_VAR: &str = "LAZY_TURNS_MODE";

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file path contains invalid UTF-8 or cannot be resolved.
    #[error("Invalid config path: {0}")]
    InvalidPath(String),

    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, built-in defaults are used.
/// Corresponds to `~/.config/lazy-turns/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Visibility mode (`hide`, `cost-deferred-render`/`cv`, `detach`).
    #[serde(default)]
    pub mode: Option<VisibilityMode>,

    /// Base visible budget and reveal step.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Reveal threshold in pixels.
    #[serde(default)]
    pub reveal_threshold_px: Option<f64>,

    /// Mutation debounce window in milliseconds.
    #[serde(default)]
    pub debounce_ms: Option<u64>,

    /// Streaming cooldown in milliseconds.
    #[serde(default)]
    pub stream_cooldown_ms: Option<u64>,

    /// Stop-control poll interval in milliseconds.
    #[serde(default)]
    pub stream_poll_ms: Option<u64>,

    /// Soft-fold delay in milliseconds.
    #[serde(default)]
    pub soft_fold_delay_ms: Option<u64>,

    /// Per-pass detach cap.
    #[serde(default)]
    pub max_detach_per_tick: Option<usize>,

    /// Per-chunk soft-fold count.
    #[serde(default)]
    pub soft_fold_chunk: Option<usize>,

    /// Size units per whitespace character.
    #[serde(default)]
    pub token_ratio: Option<f64>,

    /// Cache misses per size-estimation chunk.
    #[serde(default)]
    pub tokens_per_tick: Option<usize>,

    /// Restrict work while streaming.
    #[serde(default)]
    pub stream_safe: Option<bool>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Engine options.
    pub engine: EngineConfig,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log_file_path: default_log_path(),
        }
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/lazy-turns/lazy-turns.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("lazy-turns").join("lazy-turns.log")
    } else {
        PathBuf::from("lazy-turns.log")
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    // Missing file is not an error - use defaults
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/lazy-turns/config.toml` on Unix, appropriate path on
/// other platforms. Returns `None` if the config directory cannot be
/// determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lazy-turns").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (CLI `--config`)
/// 2. `LAZY_TURNS_CONFIG` environment variable
/// 3. Default path `~/.config/lazy-turns/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if env_path.trim().is_empty() {
            return Err(ConfigError::InvalidPath(env_path));
        }
        return load_config_file(PathBuf::from(env_path));
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

/// Apply environment variable overrides to resolved config.
///
/// Checks `LAZY_TURNS_MODE`. An unrecognised value is ignored.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> ResolvedConfig {
    if let Ok(raw) = std::env::var(MODE_ENV_VAR) {
        if let Ok(mode) = raw.parse::<VisibilityMode>() {
            config.engine.mode = mode;
        }
    }

    config
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use
/// default. The merged engine config is sanitized.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(file) = config_file else {
        return defaults;
    };

    let base = defaults.engine;
    let engine = EngineConfig {
        mode: file.mode.unwrap_or(base.mode),
        batch_size: file.batch_size.unwrap_or(base.batch_size),
        reveal_threshold_px: file.reveal_threshold_px.unwrap_or(base.reveal_threshold_px),
        debounce_ms: file.debounce_ms.unwrap_or(base.debounce_ms),
        stream_cooldown_ms: file.stream_cooldown_ms.unwrap_or(base.stream_cooldown_ms),
        stream_poll_ms: file.stream_poll_ms.unwrap_or(base.stream_poll_ms),
        soft_fold_delay_ms: file.soft_fold_delay_ms.unwrap_or(base.soft_fold_delay_ms),
        max_detach_per_tick: file.max_detach_per_tick.unwrap_or(base.max_detach_per_tick),
        soft_fold_chunk: file.soft_fold_chunk.unwrap_or(base.soft_fold_chunk),
        token_ratio: file.token_ratio.unwrap_or(base.token_ratio),
        tokens_per_tick: file.tokens_per_tick.unwrap_or(base.tokens_per_tick),
        stream_safe: file.stream_safe.unwrap_or(base.stream_safe),
        ..base
    }
    .sanitized();

    ResolvedConfig {
        engine,
        log_file_path: file.log_file_path.unwrap_or(defaults.log_file_path),
    }
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only applies overrides for flags that were explicitly set by the user.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(
    mut config: ResolvedConfig,
    mode_override: Option<VisibilityMode>,
    batch_override: Option<usize>,
    log_path_override: Option<PathBuf>,
) -> ResolvedConfig {
    if let Some(mode) = mode_override {
        config.engine.mode = mode;
    }

    if let Some(batch) = batch_override {
        config.engine.batch_size = batch.max(1);
    }

    if let Some(path) = log_path_override {
        config.log_file_path = path;
    }

    config
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
