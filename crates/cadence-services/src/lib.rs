//! Cadence Services Layer
//!
//! Orchestration on top of the storage providers and repositories: the
//! storage service (single-shot and multipart uploads, access control), the
//! asynchronous validation pipeline and the expired-session sweep. The API
//! crate talks to these services only; it never addresses a provider directly.

pub mod cleanup;
pub mod storage_service;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use cleanup::CleanupService;
pub use storage_service::{
    ChunkReceipt, FileMetadata, InitiateUpload, MultipartSession, StorageService, UploadRequest,
};
pub use validation::{
    CheckResult, FileValidationService, ValidationOutcome, ValidationQueue, ValidationReport,
};

pub use cadence_processing::{FfmpegInspector, MediaInspector};
pub use cadence_storage::{create_storage, SignedUrl, SignedUrlKind, StorageProvider};
