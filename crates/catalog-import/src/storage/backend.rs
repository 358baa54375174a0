//! Bridge from the async `object_store` crate to the blocking
//! [`ObjectStorage`] interface used by ingestion workers.
//!
//! Requests are driven with `Handle::block_on`, so these methods must be
//! called from threads that are not themselves running inside the tokio
//! runtime (the worker pool threads qualify).

use std::io::{self, Read};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio::runtime::Handle;
use url::Url;

use crate::error::StorageError;

use super::{key_segments, ObjectReader, ObjectStorage};

/// [`ObjectStorage`] backed by any `object_store` implementation.
///
/// Objects live at `<prefix>/<bucket>/<key>` inside the store.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    runtime: Handle,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, runtime: Handle) -> Self {
        Self {
            store,
            prefix: Path::default(),
            runtime,
        }
    }

    /// Builds a backend from a URL such as `file:///srv/imports` or `memory:///`.
    pub fn from_url(url: &str, runtime: Handle) -> Result<Self, StorageError> {
        let unsupported = |reason: String| StorageError::UnsupportedUrl {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| unsupported(e.to_string()))?;
        let (store, prefix) =
            object_store::parse_url(&parsed).map_err(|e| unsupported(e.to_string()))?;

        Ok(Self {
            store: Arc::from(store),
            prefix,
            runtime,
        })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<Path, StorageError> {
        let mut path = self.prefix.child(bucket);
        for segment in key_segments(bucket, key)? {
            path = path.child(segment);
        }
        Ok(path)
    }

    fn map_error(bucket: &str, key: &str, error: object_store::Error) -> StorageError {
        match error {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            source => StorageError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }
}

impl ObjectStorage for ObjectStoreBackend {
    fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError> {
        let path = self.object_path(bucket, key)?;
        let result = self
            .runtime
            .block_on(self.store.get(&path))
            .map_err(|e| Self::map_error(bucket, key, e))?;

        Ok(Box::new(BlockingObjectReader {
            runtime: self.runtime.clone(),
            stream: result.into_stream(),
            chunk: Bytes::new(),
        }))
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        self.runtime
            .block_on(self.store.put(&path, PutPayload::from(bytes)))
            .map_err(|e| Self::map_error(bucket, key, e))?;
        Ok(())
    }
}

/// Pulls one chunk at a time from the object stream.
struct BlockingObjectReader {
    runtime: Handle,
    stream: BoxStream<'static, object_store::Result<Bytes>>,
    chunk: Bytes,
}

impl Read for BlockingObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.chunk.is_empty() {
            match self.runtime.block_on(self.stream.next()) {
                Some(Ok(bytes)) => self.chunk = bytes,
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.chunk.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        self.chunk.advance(n);
        Ok(n)
    }
}
