//! Configuration module for Feedscout.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{Result, ScoutError};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Backend HTTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the discovery backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    "Feedscout/0.1 (source discovery)".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// Discovery engine tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Sources requested per catalog page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Hard ceiling on pages fetched when draining the whole catalog.
    #[serde(default = "default_max_catalog_pages")]
    pub max_catalog_pages: usize,
    /// How long a cached preview stays fresh, in seconds.
    #[serde(default = "default_preview_ttl")]
    pub preview_ttl_secs: u64,
    /// Preview fetch timeout in milliseconds.
    #[serde(default = "default_preview_timeout")]
    pub preview_timeout_ms: u64,
    /// Concurrent preview workers per search.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Candidates prefetched after a card is shown.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: usize,
    /// Maximum persisted seen-set size.
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
    /// Maximum catalog positions visited by one navigation scan.
    #[serde(default = "default_max_scan_attempts")]
    pub max_scan_attempts: usize,
    /// How long an in-place replacement waits for the exit transition, in milliseconds.
    #[serde(default = "default_exit_transition_timeout")]
    pub exit_transition_timeout_ms: u64,
    /// Delay before a navigation scan starts, in milliseconds.
    #[serde(default)]
    pub scan_debounce_ms: u64,
    /// Entries shown per card page.
    #[serde(default = "default_entries_per_card")]
    pub entries_per_card: usize,
    /// Cards per grid batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_page_size() -> usize {
    50
}

fn default_max_catalog_pages() -> usize {
    200
}

fn default_preview_ttl() -> u64 {
    180 // 3 minutes
}

fn default_preview_timeout() -> u64 {
    2000
}

fn default_concurrency_limit() -> usize {
    6
}

fn default_prefetch_count() -> usize {
    3
}

fn default_seen_capacity() -> usize {
    2000
}

fn default_max_scan_attempts() -> usize {
    500
}

fn default_exit_transition_timeout() -> u64 {
    600
}

fn default_entries_per_card() -> usize {
    5
}

fn default_batch_size() -> usize {
    6
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_catalog_pages: default_max_catalog_pages(),
            preview_ttl_secs: default_preview_ttl(),
            preview_timeout_ms: default_preview_timeout(),
            concurrency_limit: default_concurrency_limit(),
            prefetch_count: default_prefetch_count(),
            seen_capacity: default_seen_capacity(),
            max_scan_attempts: default_max_scan_attempts(),
            exit_transition_timeout_ms: default_exit_transition_timeout(),
            scan_debounce_ms: 0,
            entries_per_card: default_entries_per_card(),
            batch_size: default_batch_size(),
        }
    }
}

impl DiscoveryConfig {
    /// Preview freshness window.
    pub fn preview_ttl(&self) -> Duration {
        Duration::from_secs(self.preview_ttl_secs)
    }

    /// Preview fetch timeout.
    pub fn preview_timeout(&self) -> Duration {
        Duration::from_millis(self.preview_timeout_ms)
    }

    /// Exit transition fallback timeout.
    pub fn exit_transition_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_transition_timeout_ms)
    }

    /// Navigation debounce.
    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }
}

/// Local persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the JSON key-value file.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "data/feedscout.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Discovery engine configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ScoutError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ScoutError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDSCOUT_BACKEND_URL`: Override the backend base URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("FEEDSCOUT_BACKEND_URL") {
            if !base_url.is_empty() {
                self.backend.base_url = base_url;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend.base_url)
            .map_err(|e| ScoutError::Validation(format!("invalid backend base_url: {e}")))?;

        let discovery = &self.discovery;
        if discovery.page_size == 0 {
            return Err(ScoutError::Validation(
                "discovery.page_size must be at least 1".to_string(),
            ));
        }
        if discovery.concurrency_limit == 0 {
            return Err(ScoutError::Validation(
                "discovery.concurrency_limit must be at least 1".to_string(),
            ));
        }
        if discovery.batch_size == 0 {
            return Err(ScoutError::Validation(
                "discovery.batch_size must be at least 1".to_string(),
            ));
        }
        if discovery.entries_per_card == 0 {
            return Err(ScoutError::Validation(
                "discovery.entries_per_card must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
