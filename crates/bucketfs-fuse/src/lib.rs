#![warn(missing_docs)]

//! bucketfs FUSE subsystem.
//!
//! Translates the kernel's POSIX callback surface into object-store
//! operations through a write-back cache shared with the uploader process.

/// Attribute replies, caller context, synthetic inode hashing.
pub mod attr;
/// Attribute cache: key → envelope, authoritative after mutation.
pub mod attrcache;
/// The fuser bridge: inode callbacks onto path operations.
pub mod bridge;
/// Directory cache: per-directory immediate child sets.
pub mod dircache;
/// Error types and errno mapping.
pub mod error;
/// Inode ↔ path table for the bridge.
pub mod inode;
/// Path ↔ key translation and directory-name synthesis.
pub mod mapper;
/// Mount option assembly, mountpoint validation, FUSE session entry.
pub mod mount;
/// The POSIX operation dispatcher over store and caches.
pub mod ops;
/// Two-process lifecycle: server and uploader children, quit hand-off.
pub mod supervisor;

pub use error::{FsError, FsResult};
pub use ops::FsCore;
