use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

use super::{key_segments, ObjectReader, ObjectStorage};

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails.
fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst)?;
    std::fs::remove_file(src)?;
    Ok(())
}

/// Object storage on a local directory tree: `<root>/<bucket>/<key>`.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.join(bucket);
        for segment in key_segments(bucket, key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectStorage for FsObjectStorage {
    fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError> {
        let path = self.object_path(bucket, key)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: e,
            }),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        let write_err = |source: std::io::Error| StorageError::Write {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Readers never observe a half-written object.
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        std::fs::write(&partial, &bytes).map_err(write_err)?;
        move_file(&partial, &path).map_err(write_err)?;

        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }
}
