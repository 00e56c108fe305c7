//! Cadence Storage Library
//!
//! Provider abstraction over the backing media for file bytes, with a local
//! filesystem implementation and an S3-compatible object store implementation.
//!
//! # Storage key format
//!
//! Object keys are `{kind}/{owner_id}/{random}/{sanitized_filename}`. Keys must
//! not contain `..` or a leading `/`, and must not collide with the local
//! backend's bookkeeping names (`.multipart/`, `*.metadata.json`). Key
//! generation and checking are centralized in the `keys` module.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use cadence_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{
    ByteReader, ByteStream, CompletedPart, ObjectMetadata, SignedUrl, SignedUrlKind,
    StorageError, StorageProvider, StorageResult, StoredObject, UploadOptions,
};
