//! The two-process lifecycle.
//!
//! The supervisor spawns the filesystem server and the uploader as sibling
//! child processes of the same executable, sharing only the cache
//! directory. When the server exits (unmount), the supervisor touches the
//! `.quit` sentinel and reaps the uploader.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use bucketfs_cache::{clear_quit, request_quit};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while managing the child processes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The running executable could not be located for re-spawning.
    #[error("cannot locate executable: {0}")]
    Exe(std::io::Error),

    /// A child failed to spawn.
    #[error("failed to spawn {role} child: {source}")]
    Spawn {
        /// Which child failed.
        role: &'static str,
        /// The spawn failure.
        source: std::io::Error,
    },

    /// Waiting on a child failed.
    #[error("failed to wait for {role} child: {source}")]
    Wait {
        /// Which child failed.
        role: &'static str,
        /// The wait failure.
        source: std::io::Error,
    },

    /// The cache directory could not be prepared or signalled.
    #[error("cache directory error: {0}")]
    CacheDir(#[from] std::io::Error),
}

/// Spawns and reaps the server and uploader children.
pub struct Supervisor {
    bucket: String,
    mountpoint: PathBuf,
    cache_dir: PathBuf,
}

impl Supervisor {
    /// Builds a supervisor for one mount.
    pub fn new(bucket: &str, mountpoint: &Path, cache_dir: &Path) -> Self {
        Supervisor {
            bucket: bucket.to_string(),
            mountpoint: mountpoint.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    fn spawn_role(&self, exe: &Path, role: &'static str) -> Result<Child, SupervisorError> {
        Command::new(exe)
            .arg(format!("--role={}", role))
            .arg(&self.bucket)
            .arg(&self.mountpoint)
            .arg(&self.cache_dir)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { role, source })
    }

    /// Runs both children to completion; returns the server's exit code.
    pub fn run(&self) -> Result<i32, SupervisorError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        // A sentinel left over from a crash would stop the fresh uploader
        // on its first cycle.
        clear_quit(&self.cache_dir)?;
        let exe = std::env::current_exe().map_err(SupervisorError::Exe)?;

        let mut uploader = self.spawn_role(&exe, "uploader")?;
        info!(pid = uploader.id(), "uploader child started");

        let mut server = match self.spawn_role(&exe, "server") {
            Ok(child) => child,
            Err(e) => {
                // The uploader is already running; signal it down before
                // surfacing the failure.
                let _ = request_quit(&self.cache_dir);
                let _ = uploader.wait();
                return Err(e);
            }
        };
        info!(pid = server.id(), "filesystem server child started");

        let status = server.wait().map_err(|source| SupervisorError::Wait {
            role: "server",
            source,
        })?;
        info!(?status, "filesystem server exited, signalling uploader");

        request_quit(&self.cache_dir)?;
        match uploader.wait() {
            Ok(status) => info!(?status, "uploader exited"),
            Err(e) => warn!(error = %e, "failed to reap uploader"),
        }

        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_captures_paths() {
        let sup = Supervisor::new("b", Path::new("/mnt"), Path::new("/cache"));
        assert_eq!(sup.bucket, "b");
        assert_eq!(sup.mountpoint, Path::new("/mnt"));
        assert_eq!(sup.cache_dir, Path::new("/cache"));
    }

    #[test]
    fn test_spawn_missing_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Supervisor::new("b", Path::new("/mnt"), dir.path());
        let result = sup.spawn_role(Path::new("/no/such/binary"), "uploader");
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    }
}
