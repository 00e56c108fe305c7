use async_trait::async_trait;
use cadence_core::models::{
    ChunkMetadata, FileAsset, FileChunk, FileKind, FileStatus, TechnicalMetadata,
    ValidationStatus,
};
use cadence_core::AppError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::chunk::PostgresChunkRepository;
use super::file::PostgresFileRepository;
use super::memory::{MemoryChunkRepository, MemoryFileRepository};

/// Persistence of the three kind-specific file records behind one id index.
///
/// Status changes are compare-and-set: they return `None` when the row was not
/// in the expected state, so concurrent callers serialize on the row.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert the index row and the kind row together.
    async fn create(&self, file: &FileAsset, upload_id: Option<&str>)
        -> Result<FileAsset, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileAsset>, AppError>;

    async fn find_kind(&self, id: Uuid) -> Result<Option<FileKind>, AppError>;

    /// File created by the multipart session `upload_id`.
    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<FileAsset>, AppError>;

    /// Move `from -> to` if the row is still in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: FileStatus,
        to: FileStatus,
    ) -> Result<Option<FileAsset>, AppError>;

    /// `PROCESSING -> COMPLETE`, recording where the bytes ended up.
    async fn mark_complete(
        &self,
        id: Uuid,
        path: &str,
        size: i64,
    ) -> Result<Option<FileAsset>, AppError>;

    /// `COMPLETE -> DELETED` with `deleted_at` stamped.
    async fn soft_delete(&self, id: Uuid) -> Result<Option<FileAsset>, AppError>;

    async fn update_location(
        &self,
        id: Uuid,
        key: &str,
        filename: &str,
        path: &str,
    ) -> Result<FileAsset, AppError>;

    /// Shallow-merge `patch` into the metadata object.
    async fn merge_metadata(
        &self,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> Result<FileAsset, AppError>;

    /// Stamp `last_accessed_at` and bump `download_count`.
    async fn record_access(&self, id: Uuid) -> Result<FileAsset, AppError>;

    /// Move validation `PENDING -> IN_PROGRESS` for a COMPLETE file.
    async fn claim_validation(&self, id: Uuid) -> Result<Option<FileAsset>, AppError>;

    /// Move validation `IN_PROGRESS -> status`, recording the outcome and
    /// back-filling technical fields when present.
    async fn finish_validation(
        &self,
        id: Uuid,
        status: ValidationStatus,
        results: &serde_json::Value,
        technical: Option<&TechnicalMetadata>,
    ) -> Result<Option<FileAsset>, AppError>;

    /// Put IN_PROGRESS runs last touched before `stale_before` back to PENDING.
    async fn reset_stale_validations(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Non-deleted records whose `master_id` is `master_id`.
    async fn list_versions(&self, master_id: Uuid) -> Result<Vec<FileAsset>, AppError>;

    /// COMPLETE files still PENDING validation.
    async fn list_awaiting_validation(&self, limit: i64) -> Result<Vec<Uuid>, AppError>;

    /// Hard delete (rollback of an upload that never completed).
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

/// A multipart session with at least one chunk past its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredSession {
    pub upload_id: String,
    pub file_id: Uuid,
}

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Insert every placeholder row of a session; fails if any (upload_id, chunk_number) exists.
    async fn create_many(&self, chunks: &[FileChunk]) -> Result<(), AppError>;

    /// All chunks of a session ordered by chunk number.
    async fn find_by_upload(&self, upload_id: &str) -> Result<Vec<FileChunk>, AppError>;

    async fn find_chunk(
        &self,
        upload_id: &str,
        chunk_number: i32,
    ) -> Result<Option<FileChunk>, AppError>;

    /// Touches only the row for `chunk_number`.
    async fn mark_uploaded(
        &self,
        upload_id: &str,
        chunk_number: i32,
        metadata: &ChunkMetadata,
    ) -> Result<FileChunk, AppError>;

    async fn mark_failed(
        &self,
        upload_id: &str,
        chunk_number: i32,
        error: &str,
    ) -> Result<(), AppError>;

    /// `(uploaded, total)` rows of a session.
    async fn count_uploaded(&self, upload_id: &str) -> Result<(i64, i64), AppError>;

    async fn delete_by_upload(&self, upload_id: &str) -> Result<u64, AppError>;

    async fn find_expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredSession>, AppError>;
}

/// The repository set chosen once at startup.
#[derive(Clone)]
pub struct Repositories {
    pub files: Arc<dyn FileRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            files: Arc::new(PostgresFileRepository::new(pool.clone())),
            chunks: Arc::new(PostgresChunkRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            files: Arc::new(MemoryFileRepository::new()),
            chunks: Arc::new(MemoryChunkRepository::new()),
        }
    }
}
