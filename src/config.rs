// src/config.rs

//! Runtime configuration
//!
//! Settings are read from a TOML file (explicit path, or
//! `<config dir>/cms-export/config.toml` when present) and then overridden
//! by `CMS_BASE_URL` / `CMS_API_KEY` from the environment. Every field has
//! a default, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://percolate.com/api";

/// Environment variable overriding the API root
pub const BASE_URL_ENV: &str = "CMS_BASE_URL";

/// Environment variable supplying the API key
pub const API_KEY_ENV: &str = "CMS_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API root, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as the `Authorization` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Page size used by the pagination collector
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,

    /// Report export progress every N records
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,
}

/// Retry policy of the transport wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before a transport failure becomes fatal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between failed attempts
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Sleep after an HTTP 429
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Analytics table loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Rows per insert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows younger than this cannot be deleted
    #[serde(default = "default_streaming_buffer_minutes")]
    pub streaming_buffer_minutes: i64,

    /// Attempts on a locked table before giving up
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_limit() -> u64 {
    100
}

fn default_progress_every() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    10
}

fn default_delay_secs() -> u64 {
    1
}

fn default_rate_limit_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    500
}

fn default_streaming_buffer_minutes() -> i64 {
    90
}

fn default_max_conflict_retries() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
            rate_limit_secs: default_rate_limit_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            streaming_buffer_minutes: default_streaming_buffer_minutes(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_limit: default_page_limit(),
            progress_every: default_progress_every(),
            retry: RetryConfig::default(),
            warehouse: WarehouseConfig::default(),
        }
    }
}

impl Config {
    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if self.page_limit == 0 {
            return Err(Error::Config("page_limit must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.warehouse.batch_size == 0 {
            return Err(Error::Config("warehouse.batch_size must be greater than zero".to_string()));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!("base_url is not a valid URL: {}", self.base_url)));
        }
        Ok(())
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            debug!("Base URL overridden from {}", BASE_URL_ENV);
            self.base_url = url;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Default config file location, if a config directory exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cms-export").join("config.toml"))
}

/// Parse configuration from a TOML string
pub fn parse_config_string(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from a TOML file
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_config_string(&content)
}

/// Load configuration from an explicit path, the default location, or defaults,
/// then apply environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => parse_config_file(p)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => {
                debug!("Loading configuration from {}", p.display());
                parse_config_file(&p)?
            }
            None => Config::default(),
        },
    };
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
