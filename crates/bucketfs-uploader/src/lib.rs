//! Background uploader for bucketfs.
//!
//! An independent process that scans the shared cache directory for sidecar
//! metadata files, PUTs the matching data files to the object store, and
//! removes both on success. The `.quit` sentinel terminates the loop.

/// The scan/upload cycle and its process loop.
pub mod daemon;

pub use daemon::{Uploader, UploaderConfig, UploadStats};
