use std::path::PathBuf;

use bucketfs_store::StoreError;
use thiserror::Error;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Error variants for the staging area.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Local disk operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote store failed while materialising an entry.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A sidecar exists but cannot be used.
    #[error("malformed sidecar {path}: {reason}")]
    BadSidecar {
        /// Path of the offending sidecar.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}
