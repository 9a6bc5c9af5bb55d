use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::queue::backoff::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_RETRIES};
use crate::queue::{QueueSettings, RetryPolicy, DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_POLL_INTERVAL};
use crate::storage::StorageResolver;
use crate::webhook::IntakeMode;

pub const DEFAULT_STORAGE_ROOT_ENV: &str = "CERTDESK_STORAGE_ROOT";
pub const DEFAULT_TEMPORARY_DIR: &str = "certdesk-documents";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file. Defaults to `~/.certdesk/data/certdesk.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub desk: DeskConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit persistent root. Takes precedence over `persistent_root_env`.
    #[serde(default)]
    pub persistent_root: Option<String>,
    #[serde(default = "default_storage_root_env")]
    pub persistent_root_env: Option<String>,
    /// Fallback root. Defaults to `<tmp>/certdesk-documents`.
    #[serde(default)]
    pub temporary_root: Option<String>,
}

fn default_storage_root_env() -> Option<String> {
    Some(DEFAULT_STORAGE_ROOT_ENV.to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persistent_root: None,
            persistent_root_env: default_storage_root_env(),
            temporary_root: None,
        }
    }
}

impl StorageConfig {
    pub fn resolver(&self) -> StorageResolver {
        let temporary_root = self
            .temporary_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_TEMPORARY_DIR));
        StorageResolver::new(
            self.persistent_root.as_ref().map(PathBuf::from),
            self.persistent_root_env.clone(),
            temporary_root,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE.as_millis() as u64
}

fn default_backoff_cap_ms() -> u64 {
    DEFAULT_BACKOFF_CAP.as_millis() as u64
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl QueueConfig {
    pub fn settings(&self) -> QueueSettings {
        QueueSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_concurrent_jobs: self.max_concurrent_jobs,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base: Duration::from_millis(self.backoff_base_ms),
                cap: Duration::from_millis(self.backoff_cap_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default)]
    pub mode: IntakeMode,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub webhook_secret_file: Option<String>,
    #[serde(default)]
    pub webhook_secret_env: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_cache_capacity() -> u64 {
    DEFAULT_CACHE_CAPACITY
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            mode: IntakeMode::default(),
            webhook_secret: None,
            webhook_secret_file: None,
            webhook_secret_env: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// e.g. `https://acme.freshdesk.com`
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> Option<String> {
    Some("CERTDESK_DESK_API_KEY".to_string())
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_extractor_timeout_secs() -> u64 {
    120
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_extractor_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}
