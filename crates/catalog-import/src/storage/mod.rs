//! Object storage collaborators.
//!
//! The ingestion job only needs two calls: open a fresh byte stream for an
//! object, and store a finished artifact. Each pass of a run opens its own
//! stream, so implementations never need to support seeking.

pub mod backend;
pub mod filesystem;

use std::io::Read;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::schema::{StorageBackend, StorageConfig};
use crate::error::StorageError;

pub use backend::ObjectStoreBackend;
pub use filesystem::FsObjectStorage;

/// A sequential reader over one object's bytes.
pub type ObjectReader = Box<dyn Read + Send>;

/// Object storage as seen by the ingestion pipeline.
pub trait ObjectStorage: Send + Sync {
    /// Opens a new stream over `bucket/key`, starting at the first byte.
    fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError>;

    /// Stores `bytes` at `bucket/key`, replacing any existing object.
    fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Splits a key into path segments, rejecting empty and relative ones.
pub(crate) fn key_segments<'a>(bucket: &str, key: &'a str) -> Result<Vec<&'a str>, StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: format!("{}/{}", bucket, key),
        reason: reason.to_string(),
    };

    if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
        return Err(invalid("bucket must be a single non-empty path segment"));
    }

    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(invalid("key is empty"));
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(invalid("key must not contain '.' or '..' segments"));
    }
    Ok(segments)
}

/// Builds the storage backend described by the configuration.
///
/// The `object_store` backend bridges async requests onto `runtime`, so a
/// handle is required for it; the filesystem backend ignores it.
pub fn open(
    config: &StorageConfig,
    runtime: Option<Handle>,
) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    match config.backend {
        StorageBackend::Filesystem => {
            let root = config.root.as_deref().unwrap_or(".");
            log::info!("Using filesystem object storage at {}", root);
            Ok(Arc::new(FsObjectStorage::new(root)))
        }
        StorageBackend::ObjectStore => {
            let url = config.url.as_deref().unwrap_or_default();
            let runtime = runtime.ok_or_else(|| StorageError::UnsupportedUrl {
                url: url.to_string(),
                reason: "object_store backend requires a tokio runtime".to_string(),
            })?;
            log::info!("Using object_store backend at {}", url);
            Ok(Arc::new(ObjectStoreBackend::from_url(url, runtime)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_segments() {
        assert_eq!(
            key_segments("uploads", "errors/job-1.csv").unwrap(),
            vec!["errors", "job-1.csv"]
        );
        assert!(key_segments("uploads", "").is_err());
        assert!(key_segments("uploads", "../etc/passwd").is_err());
        assert!(key_segments("", "a.csv").is_err());
        assert!(key_segments("a/b", "a.csv").is_err());
    }

    #[test]
    fn test_open_filesystem_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Filesystem,
            root: Some(dir.path().display().to_string()),
            ..StorageConfig::default()
        };
        let storage = open(&config, None).unwrap();
        storage
            .put_object("uploads", "a.csv", b"identifier\n".to_vec())
            .unwrap();
        assert!(dir.path().join("uploads").join("a.csv").exists());
    }

    #[test]
    fn test_open_object_store_requires_runtime() {
        let config = StorageConfig {
            backend: StorageBackend::ObjectStore,
            url: Some("memory:///".to_string()),
            ..StorageConfig::default()
        };
        assert!(open(&config, None).is_err());
    }
}
