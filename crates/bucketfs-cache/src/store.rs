//! The staging store.
//!
//! One data file per key, named `{bucket},{slug(key)}`, plus an optional
//! sidecar `{bucket},{slug(key)},meta`. A data file without a sidecar is
//! in-flight or clean staging; data plus sidecar is ready for upload.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bucketfs_store::{Envelope, ObjectStore, StoreError};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::sidecar;

/// Filename-safe encoding of a key: every non-word character becomes `_`.
///
/// Not injective; the sidecar's `fn` field carries the real key.
pub fn slug(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// How `ensure_loaded` satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loaded {
    /// The data file was already staged.
    Existing,
    /// The object was downloaded from the store.
    Fetched,
    /// The store had no such object; an empty file was created.
    New,
}

/// The on-disk staging area for one bucket.
pub struct CacheStore {
    bucket: String,
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl CacheStore {
    /// Opens (creating if needed) the staging directory.
    pub fn new(bucket: &str, root: &Path, store: Arc<dyn ObjectStore>) -> CacheResult<Self> {
        std::fs::create_dir_all(root)?;
        Ok(CacheStore {
            bucket: bucket.to_string(),
            root: root.to_path_buf(),
            store,
        })
    }

    /// The bucket this staging area serves.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The staging directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the data file for a key.
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.root
            .join(sidecar::data_file_name(&self.bucket, &slug(key)))
    }

    /// Path of the sidecar for a key.
    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.root
            .join(sidecar::sidecar_file_name(&self.bucket, &slug(key)))
    }

    /// True iff the data file exists.
    pub fn exists(&self, key: &str) -> bool {
        self.data_path(key).exists()
    }

    /// True iff a sidecar exists for the key.
    pub fn has_sidecar(&self, key: &str) -> bool {
        self.meta_path(key).exists()
    }

    /// Creates an empty data file if none exists.
    pub fn create_empty(&self, key: &str) -> CacheResult<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .open(self.data_path(key))?;
        Ok(())
    }

    /// Makes sure a data file is staged for the key.
    ///
    /// An absent file is filled by a whole-object GET; a 404 materialises
    /// an empty file so later seeks and writes treat the object uniformly.
    pub fn ensure_loaded(&self, key: &str) -> CacheResult<Loaded> {
        if self.exists(key) {
            return Ok(Loaded::Existing);
        }
        match self.store.get(key) {
            Ok((_, body)) => {
                std::fs::write(self.data_path(key), &body)?;
                debug!(key, bytes = body.len(), "staged object from store");
                Ok(Loaded::Fetched)
            }
            Err(StoreError::NotFound { .. }) => {
                self.create_empty(key)?;
                debug!(key, "staged new empty object");
                Ok(Loaded::New)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads up to `size` bytes at `offset`. Short reads at EOF are not an
    /// error.
    pub fn read_range(&self, key: &str, offset: u64, size: usize) -> CacheResult<Vec<u8>> {
        let file = std::fs::File::open(self.data_path(key))?;
        let mut buf = vec![0u8; size];
        let mut read = 0;
        while read < size {
            let n = file.read_at(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buf.truncate(read);
        Ok(buf)
    }

    /// Writes bytes at `offset` without truncating; returns bytes written.
    pub fn write_range(&self, key: &str, offset: u64, data: &[u8]) -> CacheResult<usize> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.data_path(key))?;
        file.write_all_at(data, offset)?;
        Ok(data.len())
    }

    /// Truncates (or zero-extends) the data file to `length`.
    pub fn truncate(&self, key: &str, length: u64) -> CacheResult<()> {
        let file = OpenOptions::new().write(true).open(self.data_path(key))?;
        file.set_len(length)?;
        Ok(())
    }

    /// Current size of the data file.
    pub fn file_size(&self, key: &str) -> CacheResult<u64> {
        Ok(std::fs::metadata(self.data_path(key))?.len())
    }

    /// Publishes the sidecar for a key, atomically.
    ///
    /// Written to a temporary name and renamed into place so the uploader
    /// never observes a partial envelope.
    pub fn write_meta(&self, key: &str, envelope: &Envelope) -> CacheResult<()> {
        let meta_path = self.meta_path(key);
        // Append rather than with_extension: bucket names may contain dots.
        let mut tmp_name = meta_path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        let body = serde_json::to_vec(envelope).map_err(|e| CacheError::BadSidecar {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &meta_path)?;
        debug!(key, sidecar = %meta_path.display(), "published sidecar");
        Ok(())
    }

    /// Removes the data file and sidecar; absence is not an error.
    pub fn clear(&self, key: &str) -> CacheResult<()> {
        for path in [self.data_path(key), self.meta_path(key)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key, path = %path.display(), error = %e, "failed to clear cache entry");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}
