//! On-disk staging area shared by the filesystem server and the uploader.
//!
//! One flat directory holds, per dirty object, a data file and a sidecar
//! metadata file; the sidecar's presence is the commit record that hands
//! the object to the uploader. A `.quit` sentinel file in the same
//! directory is the only shutdown signal between the two processes.

/// Error types for cache operations.
pub mod error;
/// Sidecar naming, serialisation and directory scanning.
pub mod sidecar;
/// The staging store: data files, ranged I/O, sidecar emission.
pub mod store;

pub use error::{CacheError, CacheResult};
pub use sidecar::{parse_sidecar_name, read_sidecar, scan_sidecars, SidecarEntry};
pub use store::{slug, CacheStore, Loaded};

use std::path::Path;

/// Sentinel filename whose presence tells the uploader to exit.
pub const QUIT_SENTINEL: &str = ".quit";

/// True iff the shutdown sentinel exists in the cache directory.
pub fn quit_requested(cache_dir: &Path) -> bool {
    cache_dir.join(QUIT_SENTINEL).exists()
}

/// Creates the shutdown sentinel.
pub fn request_quit(cache_dir: &Path) -> std::io::Result<()> {
    std::fs::write(cache_dir.join(QUIT_SENTINEL), b"")
}

/// Removes the shutdown sentinel; absence is not an error.
pub fn clear_quit(cache_dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(cache_dir.join(QUIT_SENTINEL)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
