//! Uploader configuration
//!
//! Built from the shared [`TomlConfig`] (file, then environment) with
//! command-line overrides applied last, then validated.

use ingest_common::config::TomlConfig;
use ingest_common::Error;
use std::time::Duration;

use crate::event_stream::ReconnectPolicy;
use crate::queue::QueueLimits;
use crate::store::StoreOptions;

/// Capacity of the UI event bus
pub const EVENT_BUS_CAPACITY: usize = 1000;

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub backend_url: String,
    pub limits: QueueLimits,
    pub activity_log_capacity: usize,
    pub early_event_buffer: usize,
    pub reconnect: ReconnectPolicy,
    pub request_timeout: Duration,
    pub log_level: String,
}

/// Command-line overrides; `None` keeps the configured value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub max_file_size_bytes: Option<u64>,
    pub max_queue_len: Option<usize>,
}

impl UploaderConfig {
    pub fn from_toml(toml: &TomlConfig) -> Self {
        Self {
            backend_url: toml.backend_url.clone(),
            limits: QueueLimits {
                max_file_size_bytes: toml.max_file_size_bytes,
                max_queue_len: toml.max_queue_len,
            },
            activity_log_capacity: toml.activity_log_capacity,
            early_event_buffer: toml.early_event_buffer,
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(toml.reconnect_delay_ms),
                max_delay: Duration::from_millis(toml.max_reconnect_delay_ms),
            },
            request_timeout: Duration::from_secs(toml.request_timeout_secs),
            log_level: toml.logging.level.clone(),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(url) = overrides.backend_url {
            self.backend_url = url;
        }
        if let Some(size) = overrides.max_file_size_bytes {
            self.limits.max_file_size_bytes = size;
        }
        if let Some(len) = overrides.max_queue_len {
            self.limits.max_queue_len = len;
        }
        self
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let url = self.backend_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend_url must be an http(s) URL, got '{}'",
                self.backend_url
            )));
        }
        if self.limits.max_file_size_bytes == 0 {
            return Err(Error::Config("max_file_size_bytes must be greater than 0".to_string()));
        }
        if self.limits.max_queue_len == 0 {
            return Err(Error::Config("max_queue_len must be greater than 0".to_string()));
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(Error::Config("reconnect_delay_ms must be greater than 0".to_string()));
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(Error::Config(
                "max_reconnect_delay_ms must not be below reconnect_delay_ms".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            limits: self.limits,
            activity_log_capacity: self.activity_log_capacity,
            early_event_buffer: self.early_event_buffer,
        }
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}
