//! Configuration loading
//!
//! Resolution priority (highest first):
//! 1. Command-line argument (applied by the binary on top of the result)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and defaults
//! are used. A file that exists but does not parse is a `Config` error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "INGEST_CONFIG";
/// Environment variable overriding `backend_url`
pub const BACKEND_URL_ENV_VAR: &str = "INGEST_BACKEND_URL";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_QUEUE_LEN: usize = 100;
pub const DEFAULT_ACTIVITY_LOG_CAPACITY: usize = 500;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EARLY_EVENT_BUFFER: usize = 256;

/// On-disk configuration (`config.toml`)
///
/// Every field is optional in the file; absent fields take compiled defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Base URL of the ingestion backend (`/upload`, `/events`, ... hang off it)
    pub backend_url: String,
    /// Files larger than this are rejected at enqueue
    pub max_file_size_bytes: u64,
    /// Maximum number of files in the queue
    pub max_queue_len: usize,
    /// Activity log entries kept (0 = unbounded)
    pub activity_log_capacity: usize,
    /// Initial event stream reconnection delay
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnection backoff
    pub max_reconnect_delay_ms: u64,
    /// Timeout for the batch upload request
    pub request_timeout_secs: u64,
    /// Events buffered while waiting for the session id
    pub early_event_buffer: usize,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            activity_log_capacity: DEFAULT_ACTIVITY_LOG_CAPACITY,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_delay_ms: DEFAULT_MAX_RECONNECT_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            early_event_buffer: DEFAULT_EARLY_EVENT_BUFFER,
            logging: LoggingConfig::default(),
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive (`info`, `debug`, `ingest_uploader=trace`, ...)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Platform config location: `<config_dir>/invoice-ingest/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("invoice-ingest").join("config.toml"))
}

/// Pick the config file: CLI argument, then `INGEST_CONFIG`, then the platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Read and parse one TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with environment overrides applied
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_path) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            TomlConfig::default()
        }
    };

    if let Ok(url) = std::env::var(BACKEND_URL_ENV_VAR) {
        if !url.trim().is_empty() {
            info!("Backend URL overridden by {}", BACKEND_URL_ENV_VAR);
            config.backend_url = url;
        }
    }

    Ok(config)
}
