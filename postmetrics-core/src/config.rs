//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/postmetrics/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/postmetrics/` (~/.config/postmetrics/)
//! - Data: `$XDG_DATA_HOME/postmetrics/` (~/.local/share/postmetrics/)
//! - State/Logs: `$XDG_STATE_HOME/postmetrics/` (~/.local/state/postmetrics/)

use crate::chunker::MAX_SPAN_DAYS;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Remote analytics account credentials
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Remote fetch tuning
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Resolver window and cache settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote analytics account settings.
///
/// The remote tier is only enabled when all three fields are set.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AnalyticsConfig {
    /// Account name, used as the API host prefix
    pub account_name: Option<String>,
    /// Property the page paths belong to
    pub property_id: Option<String>,
    /// API key, sent in the `X-API-KEY` header
    pub api_key: Option<String>,
}

impl AnalyticsConfig {
    /// Check if every credential is present. Blank values count as unset.
    pub fn is_ready(&self) -> bool {
        is_set(&self.account_name) && is_set(&self.property_id) && is_set(&self.api_key)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match &self.account_name {
            None => {
                return Err(Error::Config(
                    "analytics.account_name is required".to_string(),
                ))
            }
            Some(name) if !is_valid_account_name(name) => {
                return Err(Error::Config(format!(
                    "analytics.account_name is not a valid host label: {:?}",
                    name
                )))
            }
            Some(_) => {}
        }
        if self.property_id.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(
                "analytics.property_id is required".to_string(),
            ));
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("analytics.api_key is required".to_string()));
        }
        Ok(())
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

fn is_valid_account_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Remote fetch settings
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Chunk requests in flight per subject
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Override for the API base URL (defaults to the account-scoped host)
    pub base_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            base_url: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_max_concurrent_chunks() -> usize {
    4
}

/// Resolver settings
#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Length of the trailing window in days
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Longest span of a single remote query
    #[serde(default = "default_max_span_days")]
    pub max_span_days: u32,

    /// Lifetime of short-lived cache entries in seconds
    #[serde(default = "default_short_ttl")]
    pub short_ttl_secs: u64,

    /// Subjects resolved concurrently for a listing page
    #[serde(default = "default_max_concurrent_subjects")]
    pub max_concurrent_subjects: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_span_days: default_max_span_days(),
            short_ttl_secs: default_short_ttl(),
            max_concurrent_subjects: default_max_concurrent_subjects(),
        }
    }
}

impl ResolverConfig {
    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.short_ttl_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.max_span_days == 0 {
            return Err(Error::Config(
                "resolver.max_span_days must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_subjects == 0 {
            return Err(Error::Config(
                "resolver.max_concurrent_subjects must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_window_days() -> u32 {
    30
}

fn default_max_span_days() -> u32 {
    MAX_SPAN_DAYS
}

fn default_short_ttl() -> u64 {
    3600
}

fn default_max_concurrent_subjects() -> usize {
    4
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Log directory override (defaults to the XDG state directory)
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Directory the rolling log files are written to
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(Config::state_dir)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.resolver.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/postmetrics/config.toml` (~/.config/postmetrics/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("postmetrics").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("postmetrics")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("postmetrics")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/postmetrics/data.db` (~/.local/share/postmetrics/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("postmetrics.log")
    }
}
