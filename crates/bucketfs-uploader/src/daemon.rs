//! The scan/upload cycle.
//!
//! A sidecar's presence is the commit record: data without a sidecar means
//! in-flight writes from the filesystem server, data plus sidecar means
//! ready, neither means clean or uploaded. A crash at any point leaves a
//! state the next scan recovers from, so failures here only log and leave
//! files in place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bucketfs_cache::{clear_quit, quit_requested, read_sidecar, scan_sidecars};
use bucketfs_store::ObjectStore;
use tracing::{debug, info, warn};

/// Settings for the uploader process.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Bucket whose sidecars this uploader owns.
    pub bucket: String,
    /// The shared cache directory.
    pub cache_dir: PathBuf,
    /// Pause between scan cycles.
    pub interval: Duration,
}

impl UploaderConfig {
    /// Settings with the standard 3 s scan interval.
    pub fn new(bucket: &str, cache_dir: PathBuf) -> Self {
        UploaderConfig {
            bucket: bucket.to_string(),
            cache_dir,
            interval: Duration::from_secs(3),
        }
    }
}

/// Counters across the uploader's lifetime.
#[derive(Debug, Default, Clone)]
pub struct UploadStats {
    /// Objects PUT and cleaned up.
    pub uploaded: u64,
    /// Sidecars skipped as corrupt (missing `fn` or data file).
    pub skipped: u64,
    /// Upload attempts that failed and were left for the next cycle.
    pub failed: u64,
    /// Scan cycles completed.
    pub cycles: u64,
}

/// Drains staged sidecars into the object store.
pub struct Uploader {
    config: UploaderConfig,
    store: Arc<dyn ObjectStore>,
    stats: UploadStats,
}

impl Uploader {
    /// Creates an uploader over a store handle.
    pub fn new(config: UploaderConfig, store: Arc<dyn ObjectStore>) -> Self {
        Uploader {
            config,
            store,
            stats: UploadStats::default(),
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> UploadStats {
        self.stats.clone()
    }

    /// Runs one scan cycle; returns the number of objects uploaded.
    pub fn run_once(&mut self) -> std::io::Result<u64> {
        let sidecars = scan_sidecars(&self.config.cache_dir, &self.config.bucket)?;
        let mut uploaded = 0;

        for entry in sidecars {
            let envelope = match read_sidecar(&entry.meta_path) {
                Ok(env) => env,
                Err(e) => {
                    warn!(sidecar = %entry.meta_path.display(), error = %e, "skipping unreadable sidecar");
                    self.stats.skipped += 1;
                    continue;
                }
            };

            let key = match &envelope.upload_key {
                Some(key) => key.clone(),
                None => {
                    warn!(sidecar = %entry.meta_path.display(), "sidecar missing fn field, skipping");
                    self.stats.skipped += 1;
                    continue;
                }
            };

            if !entry.data_path.exists() {
                warn!(key, data = %entry.data_path.display(), "sidecar without data file, skipping");
                self.stats.skipped += 1;
                continue;
            }

            let headers = envelope.to_headers();
            match self
                .store
                .put_from_file(&key, &entry.data_path, &headers)
            {
                Ok(()) => {
                    // The sidecar is the commit record; it goes first.
                    if let Err(e) = std::fs::remove_file(&entry.meta_path) {
                        warn!(key, error = %e, "uploaded but failed to remove sidecar");
                        continue;
                    }
                    if let Err(e) = std::fs::remove_file(&entry.data_path) {
                        warn!(key, error = %e, "uploaded but failed to remove data file");
                    }
                    debug!(key, "uploaded staged object");
                    self.stats.uploaded += 1;
                    uploaded += 1;
                }
                Err(e) => {
                    warn!(key, error = %e, "upload failed, leaving sidecar for next cycle");
                    self.stats.failed += 1;
                }
            }
        }

        self.stats.cycles += 1;
        Ok(uploaded)
    }

    /// The process loop: check the sentinel, scan, sleep, repeat.
    pub fn run(&mut self) -> std::io::Result<()> {
        info!(
            bucket = %self.config.bucket,
            cache = %self.config.cache_dir.display(),
            "uploader started"
        );
        loop {
            if quit_requested(&self.config.cache_dir) {
                clear_quit(&self.config.cache_dir)?;
                info!("quit sentinel observed, uploader exiting");
                return Ok(());
            }
            if let Err(e) = self.run_once() {
                warn!(error = %e, "scan cycle failed");
            }
            std::thread::sleep(self.config.interval);
        }
    }
}
