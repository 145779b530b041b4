//! Loads the two-line credential file.
//!
//! `$HOME/.s3fs/.secret` holds exactly two newline-terminated lines: the
//! access key id and the secret access key. A missing or short file is a
//! fatal startup condition for the caller.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Access key pair for request signing.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Access key id (public half).
    pub access_key_id: String,
    /// Secret access key (signing half).
    pub secret_access_key: String,
}

/// Errors raised while loading the credential file.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The credential file does not exist or cannot be read.
    #[error("cannot read credential file {path}: {source}")]
    Unreadable {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The file exists but does not hold two non-empty lines.
    #[error("malformed credential file {path}: expected two newline-terminated lines")]
    Malformed {
        /// Path that was parsed.
        path: PathBuf,
    },

    /// `$HOME` is not set, so the default location cannot be resolved.
    #[error("HOME is not set; cannot locate credential file")]
    NoHome,
}

impl Credentials {
    /// Builds credentials directly, for tests and embedded configuration.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Credentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        }
    }

    /// Loads from the default location, `$HOME/.s3fs/.secret`.
    pub fn load_default() -> Result<Self, CredentialsError> {
        let home = std::env::var_os("HOME").ok_or(CredentialsError::NoHome)?;
        let path = Path::new(&home).join(".s3fs").join(".secret");
        Self::load_from(&path)
    }

    /// Loads from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, CredentialsError> {
        let text = std::fs::read_to_string(path).map_err(|source| CredentialsError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut lines = text.lines().map(str::trim);
        let access_key_id = lines.next().unwrap_or("");
        let secret_access_key = lines.next().unwrap_or("");

        if access_key_id.is_empty() || secret_access_key.is_empty() {
            return Err(CredentialsError::Malformed {
                path: path.to_path_buf(),
            });
        }

        Ok(Credentials::new(access_key_id, secret_access_key))
    }
}
