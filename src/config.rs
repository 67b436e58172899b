//! Configuration
//!
//! `revchain.json`, every field optional:
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "journal_fsync": true,
//!   "log_level": "info",
//!   "retry": { "max_attempts": 3, "base_delay_ms": 10, "max_delay_ms": 200 },
//!   "http": { "host": "127.0.0.1", "port": 8787, "cors_origins": [] }
//! }
//! ```
//!
//! Without `data_dir` the store is purely in-memory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Upper bound on commit attempts a config may request.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Transient commit retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff ceiling in milliseconds (default: 10)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds (default: 200)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// HTTP adapter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to (default: "127.0.0.1")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8787)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins (default: none)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Journal location; absent means in-memory only
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// fsync every journal append (default: true)
    #[serde(default = "default_journal_fsync")]
    pub journal_fsync: bool,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_journal_fsync() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            journal_fsync: default_journal_fsync(),
            log_level: default_log_level(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates config JSON.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.severity().is_none() {
            return Err(ConfigError::Invalid(format!(
                "log_level '{}' must be one of trace, info, warn, error, fatal",
                self.log_level
            )));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {}",
                MAX_RETRY_ATTEMPTS
            )));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
            ));
        }
        if self.http.host.is_empty() {
            return Err(ConfigError::Invalid("http.host must not be empty".into()));
        }
        Ok(())
    }

    /// Parsed `log_level`.
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.log_level)
    }

    pub fn data_path(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}
