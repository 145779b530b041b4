use bucketfs_cache::CacheError;
use bucketfs_store::StoreError;
use thiserror::Error;

/// Result type alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors a filesystem operation can surface to the kernel.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path names no object.
    #[error("no such entry")]
    NotFound,

    /// The remote store failed (non-404).
    #[error("store failure: {0}")]
    Store(StoreError),

    /// A cache-store disk operation failed.
    #[error("local I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The request is malformed (empty key where one is required).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is not supported by this filesystem.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl FsError {
    /// Maps to the errno returned to the kernel.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::Store(_) => libc::EIO,
            FsError::Io(_) => libc::EIO,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::Unsupported(_) => libc::EOPNOTSUPP,
        }
    }
}

impl From<StoreError> for FsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => FsError::NotFound,
            other => FsError::Store(other),
        }
    }
}

impl From<CacheError> for FsError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Io(io) => FsError::Io(io),
            CacheError::Store(StoreError::NotFound { .. }) => FsError::NotFound,
            CacheError::Store(other) => FsError::Store(other),
            CacheError::BadSidecar { .. } => {
                FsError::Io(std::io::Error::other(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_errno() {
        assert_eq!(FsError::NotFound.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_store_failure_is_eio() {
        let err = FsError::Store(StoreError::Transport {
            key: "k".to_string(),
            msg: "timeout".to_string(),
        });
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_local_io_is_eio() {
        let err = FsError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_invalid_argument_errno() {
        assert_eq!(
            FsError::InvalidArgument("empty path").to_errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn test_unsupported_errno() {
        assert_eq!(FsError::Unsupported("link").to_errno(), libc::EOPNOTSUPP);
    }

    #[test]
    fn test_store_not_found_converts_to_not_found() {
        let err: FsError = StoreError::NotFound {
            key: "k".to_string(),
        }
        .into();
        assert!(matches!(err, FsError::NotFound));
    }

    #[test]
    fn test_store_transport_converts_to_store() {
        let err: FsError = StoreError::Transport {
            key: "k".to_string(),
            msg: "m".to_string(),
        }
        .into();
        assert!(matches!(err, FsError::Store(_)));
    }

    #[test]
    fn test_cache_error_converts() {
        let err: FsError = CacheError::Io(std::io::Error::from(std::io::ErrorKind::Other)).into();
        assert_eq!(err.to_errno(), libc::EIO);
    }
}
