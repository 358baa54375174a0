use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] crate::ingest::SubmitError),

    #[error("Progress error: {0}")]
    Publish(#[from] crate::progress::PublishError),

    #[error("Logging setup failed: {0}")]
    Telemetry(#[from] TelemetryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to read '{bucket}/{key}': {source}")]
    Read {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{bucket}/{key}': {source}")]
    Write {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store request for '{bucket}/{key}' failed: {source}")]
    Backend {
        bucket: String,
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Unsupported storage URL '{url}': {reason}")]
    UnsupportedUrl { url: String, reason: String },
}

impl StorageError {
    /// Whether retrying the same request later could succeed.
    ///
    /// The ingestion job treats both kinds as fatal to the run; the
    /// distinction is kept for callers that schedule retries.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::NotFound { .. }
            | StorageError::InvalidKey { .. }
            | StorageError::UnsupportedUrl { .. } => false,
            StorageError::Read { source, .. } | StorageError::Write { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            StorageError::Backend { source, .. } => !matches!(
                source,
                object_store::Error::NotFound { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::NotSupported { .. }
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, ImportError>;
