use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for object-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The remote store has no object under this key.
    #[error("object not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },

    /// The request never produced a usable response (connect failure,
    /// timeout, exhausted retries).
    #[error("transport failure for {key}: {msg}")]
    Transport {
        /// The key the request targeted.
        key: String,
        /// Description of the underlying failure.
        msg: String,
    },

    /// The store answered with a status the caller cannot act on.
    #[error("unexpected status {code} for {key}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// The key the request targeted.
        key: String,
    },

    /// Local I/O failed while staging a request body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True iff this error is the remote 404 case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
