//! The attribute envelope carried alongside every object.
//!
//! Mode, times, size and acl are persisted as `x-amz-meta-s3fs-*` user
//! metadata headers on the object; the same structure, serialised to JSON,
//! is the cache sidecar that hands an object to the uploader. Fields missing
//! on read-back fill with the defaults below.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Prefix for user metadata headers owned by this filesystem.
pub const META_PREFIX: &str = "x-amz-meta-s3fs-";
/// Visibility header, sent on every PUT.
pub const ACL_HEADER: &str = "x-amz-acl";
/// Server-side copy header; body is ignored when present.
pub const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// Default mode for regular files: `rw-r--r--`.
pub const MODE_FILE_DEFAULT: u32 = 0o100644;
/// Default mode for directories: `rwxr-xr-x`.
pub const MODE_DIR_DEFAULT: u32 = 0o40755;
/// Default mode for symlinks: `rwxrwxrwx`.
pub const MODE_SYMLINK_DEFAULT: u32 = 0o120777;
/// Synthetic size reported for directories.
pub const DIR_SIZE: u64 = 4;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o40000;
const S_IFLNK: u32 = 0o120000;

/// Seconds since the epoch, now.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Per-object attribute bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// File-type plus permission bits.
    pub mode: u32,
    /// Access time, seconds since epoch.
    pub atime: i64,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
    /// Change time, seconds since epoch.
    pub ctime: i64,
    /// Size in bytes; authoritative for regular files.
    pub size: u64,
    /// Visibility token, fixed to `private`.
    pub acl: String,
    /// Copy source (`bucket/key`), set only while a copy PUT is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_source: Option<String>,
    /// Target key; present only inside a sidecar so the uploader knows
    /// where to PUT.
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub upload_key: Option<String>,
}

impl Envelope {
    /// Envelope for a fresh regular file.
    pub fn new_file(size: u64) -> Self {
        Self::with_mode(MODE_FILE_DEFAULT, size)
    }

    /// Envelope for a fresh directory.
    pub fn new_dir() -> Self {
        Self::with_mode(MODE_DIR_DEFAULT, DIR_SIZE)
    }

    /// Envelope for a fresh symlink whose target is `target_len` bytes.
    pub fn new_symlink(target_len: u64) -> Self {
        Self::with_mode(MODE_SYMLINK_DEFAULT, target_len)
    }

    fn with_mode(mode: u32, size: u64) -> Self {
        let now = now_epoch();
        Envelope {
            mode,
            atime: now,
            mtime: now,
            ctime: now,
            size,
            acl: "private".to_string(),
            copy_source: None,
            upload_key: None,
        }
    }

    /// True iff the mode carries the directory file type.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// True iff the mode carries the symlink file type.
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Renders the envelope as request headers for a PUT.
    ///
    /// `copy_source` rides as `x-amz-copy-source` when set; `upload_key`
    /// never travels as a header.
    pub fn to_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (ACL_HEADER.to_string(), self.acl.clone()),
            (format!("{}mode", META_PREFIX), self.mode.to_string()),
            (format!("{}atime", META_PREFIX), self.atime.to_string()),
            (format!("{}mtime", META_PREFIX), self.mtime.to_string()),
            (format!("{}ctime", META_PREFIX), self.ctime.to_string()),
        ];
        if let Some(source) = &self.copy_source {
            headers.push((COPY_SOURCE_HEADER.to_string(), source.clone()));
        }
        headers
    }

    /// Rebuilds an envelope from lower-cased response headers.
    ///
    /// Missing fields take the defaults: regular-file mode, times = now.
    /// Size comes from the response content length.
    pub fn from_headers(headers: &HashMap<String, String>, size: u64) -> Self {
        let now = now_epoch();
        let field = |name: &str| headers.get(&format!("{}{}", META_PREFIX, name));
        let int = |name: &str, default: i64| {
            field(name)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };

        Envelope {
            mode: field("mode")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(MODE_FILE_DEFAULT),
            atime: int("atime", now),
            mtime: int("mtime", now),
            ctime: int("ctime", now),
            size,
            acl: "private".to_string(),
            copy_source: None,
            upload_key: None,
        }
    }
}
