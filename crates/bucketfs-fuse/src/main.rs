#![warn(missing_docs)]
//! bucketfs mount daemon
//!
//! Usage: bucketfs <bucket> <mountpoint> <cache-dir>
//!
//! The plain invocation supervises two child processes of this same
//! executable: the filesystem server (`--role=server`) and the uploader
//! (`--role=uploader`), sharing the cache directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bucketfs_fuse::supervisor::Supervisor;
use bucketfs_fuse::{mount, FsCore};
use bucketfs_store::{Credentials, ObjectStore, S3Client, S3Config};
use bucketfs_uploader::{Uploader, UploaderConfig};

fn print_usage(prog: &str) {
    eprintln!("Usage: {} <bucket> <mountpoint> <cache-dir>", prog);
    eprintln!();
    eprintln!("Credentials are read from $HOME/.s3fs/.secret (two lines:");
    eprintln!("access key id, secret access key).");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  BUCKETFS_ENDPOINT  Override the S3 endpoint URL");
    eprintln!("  BUCKETFS_REGION    Override the signing region");
    eprintln!("  BUCKETFS_VOLNAME   Volume name mount option");
    eprintln!("  BUCKETFS_IOSIZE    I/O size mount option");
}

fn build_store(bucket: &str) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let credentials = Credentials::load_default().context("loading credentials")?;
    let mut config = S3Config::new(bucket);
    if let Ok(endpoint) = std::env::var("BUCKETFS_ENDPOINT") {
        config.endpoint = endpoint;
    }
    if let Ok(region) = std::env::var("BUCKETFS_REGION") {
        config.region = region;
    }
    let client = S3Client::new(config, &credentials).context("building store client")?;
    Ok(Arc::new(client))
}

fn run_server(bucket: &str, mountpoint: &Path, cache_dir: &Path) -> anyhow::Result<()> {
    let store = build_store(bucket)?;
    let core = FsCore::new(bucket, store, cache_dir).context("opening cache directory")?;
    let volname = std::env::var("BUCKETFS_VOLNAME").ok();
    let iosize = std::env::var("BUCKETFS_IOSIZE")
        .ok()
        .and_then(|v| v.parse().ok());
    tracing::info!(bucket, mountpoint = %mountpoint.display(), "mounting");
    mount::serve(core, mountpoint, volname.as_deref(), iosize).context("FUSE session failed")?;
    Ok(())
}

fn run_uploader(bucket: &str, cache_dir: &Path) -> anyhow::Result<()> {
    let store = build_store(bucket)?;
    let config = UploaderConfig::new(bucket, cache_dir.to_path_buf());
    Uploader::new(config, store).run().context("uploader loop failed")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let prog = args.first().map(|s| s.as_str()).unwrap_or("bucketfs");

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(prog);
        return Ok(());
    }

    let mut role: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();
    for arg in &args[1..] {
        if let Some(r) = arg.strip_prefix("--role=") {
            role = Some(r.to_string());
        } else {
            positional.push(arg.clone());
        }
    }

    if positional.len() != 3 {
        print_usage(prog);
        std::process::exit(1);
    }
    let bucket = positional[0].as_str();
    let mountpoint = PathBuf::from(&positional[1]);
    let cache_dir = PathBuf::from(&positional[2]);

    match role.as_deref() {
        None => {
            // Fail fast on the startup conditions before spawning anything.
            Credentials::load_default().context("loading credentials")?;
            mount::validate_mountpoint(&mountpoint).context("validating mountpoint")?;

            let supervisor = Supervisor::new(bucket, &mountpoint, &cache_dir);
            let code = supervisor.run().context("supervising children")?;
            std::process::exit(code);
        }
        Some("server") => run_server(bucket, &mountpoint, &cache_dir),
        Some("uploader") => run_uploader(bucket, &cache_dir),
        Some(other) => anyhow::bail!("unknown role: {}", other),
    }
}
