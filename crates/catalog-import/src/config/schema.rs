use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            worker_count: default_worker_count(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            cache: CacheConfig::default(),
            publisher: PublisherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    ObjectStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend.
    #[serde(default)]
    pub root: Option<String>,
    /// Store URL for the object_store backend, e.g. `file:///srv/imports`.
    #[serde(default)]
    pub url: Option<String>,
    /// Bucket holding uploaded files and error artifacts.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_error_prefix")]
    pub error_prefix: String,
}

fn default_bucket() -> String {
    "uploads".to_string()
}

fn default_error_prefix() -> String {
    "errors".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: None,
            url: None,
            bucket: default_bucket(),
            error_prefix: default_error_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Applied rows between persisted checkpoints of the job counters.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    /// Pause after each applied batch.
    #[serde(default)]
    pub batch_pause_ms: u64,
}

fn default_batch_size() -> usize {
    2000
}

fn default_checkpoint_interval() -> u64 {
    10_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
            batch_pause_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    #[serde(default = "default_time_to_idle_secs")]
    pub time_to_idle_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    10_000
}

fn default_time_to_idle_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: default_max_capacity(),
            time_to_idle_secs: default_time_to_idle_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    /// Buffered snapshots per subscriber channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_subscribers() -> usize {
    64
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_subscribers: default_max_subscribers(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
