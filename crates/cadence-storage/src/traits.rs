//! Storage provider abstraction
//!
//! Every backing medium implements [`StorageProvider`]: byte-level object
//! operations plus the multipart primitives used by chunked uploads.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::AppError;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Multipart upload failed: {0}")]
    MultipartFailed(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Streamed object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Streamed upload source.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// User metadata attached to the object.
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            metadata: HashMap::new(),
        }
    }
}

/// Result of a write: where the object lives and how to address it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub custom: HashMap<String, String>,
}

/// Whether a signed URL actually carries an enforced expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedUrlKind {
    /// Genuinely time-limited pre-signed reference.
    Presigned,
    /// Plain reference for a backend without signing; not safe to hand to untrusted clients.
    LocalReference,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub kind: SignedUrlKind,
}

impl SignedUrl {
    pub fn is_network_safe(&self) -> bool {
        self.kind == SignedUrlKind::Presigned && self.expires_at.is_some()
    }
}

/// Provider acknowledgement of one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Storage provider trait
///
/// Injected once at startup as an `Arc<dyn StorageProvider>`. All writes
/// overwrite whatever already lives at the key.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Write a whole buffer to `key`.
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject>;

    /// Write from a reader until EOF without holding the whole payload in memory.
    async fn upload_stream(
        &self,
        key: &str,
        reader: ByteReader,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject>;

    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Time-limited retrieval reference.
    ///
    /// Backends that cannot enforce expiry return [`SignedUrlKind::LocalReference`]
    /// with no `expires_at`.
    async fn get_signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl>;

    /// Delete the object (and any backend-side companions). Missing keys are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    async fn get_metadata(&self, key: &str) -> StorageResult<ObjectMetadata>;

    /// Replace the object's user metadata.
    async fn update_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<ObjectMetadata>;

    async fn move_object(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject>;

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject>;

    /// Open a multipart session whose result will land at `key`.
    async fn initiate_multipart_upload(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart>;

    /// Assemble `parts` in ascending part number into the object at `key`.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<StoredObject>;

    /// Discard the session and every part uploaded to it.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Public address of `key` (not signed).
    fn object_url(&self, key: &str) -> String;

    fn base_path(&self) -> String;

    fn backend_type(&self) -> StorageBackend;
}
