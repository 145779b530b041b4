//! Object-store client for bucketfs.
//!
//! Exposes the typed operation surface the filesystem and uploader consume
//! (`ObjectStore`), an S3 REST implementation over reqwest with SigV4
//! signing, an in-memory store for tests, and the attribute envelope that
//! rides on every object as user metadata.

/// The `ObjectStore` trait, listing types and the in-memory test store.
pub mod client;
/// Credential file loading.
pub mod credentials;
/// Error types for store operations.
pub mod error;
/// The attribute envelope and its header round-trip.
pub mod meta;
/// S3 REST client.
pub mod s3;
/// AWS Signature Version 4 request signing.
pub mod sign;

pub use client::{ListEntry, MemoryStore, ObjectHead, ObjectStore};
pub use credentials::{Credentials, CredentialsError};
pub use error::{StoreError, StoreResult};
pub use meta::Envelope;
pub use s3::{S3Client, S3Config};
