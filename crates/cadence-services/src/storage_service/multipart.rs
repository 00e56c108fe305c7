//! Chunked upload sessions.
//!
//! A session is one PENDING file record plus one placeholder chunk row per
//! part. The provider's multipart upload id doubles as the session id. Each
//! chunk request touches only its own row; the request that observes every
//! chunk uploaded triggers finalize, and the PENDING -> PROCESSING transition
//! on the file row decides which caller actually assembles.

use bytes::Bytes;
use cadence_core::models::{
    placeholder_chunks, ChunkMetadata, FileAsset, FileKind, FileStatus, UploadProgress,
};
use cadence_core::validation::validate_user_metadata;
use cadence_core::AppError;
use cadence_db::ExpiredSession;
use cadence_processing::MediaValidator;
use cadence_storage::keys::generate_object_key;
use cadence_storage::CompletedPart;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{object_options, resolve_kind, sha256_hex, StorageService};

#[derive(Debug, Clone)]
pub struct InitiateUpload {
    pub filename: String,
    pub content_type: String,
    pub total_size: u64,
    pub owner_id: Uuid,
    pub kind: Option<FileKind>,
    pub is_public: bool,
    pub metadata: serde_json::Value,
    pub master_id: Option<Uuid>,
}

/// What a client needs to start sending chunks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MultipartSession {
    pub upload_id: String,
    pub file_id: Uuid,
    pub kind: FileKind,
    pub chunk_size: u64,
    pub total_chunks: i32,
    pub total_size: u64,
    pub expires_at: DateTime<Utc>,
}

/// Acknowledgement of one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChunkReceipt {
    pub upload_id: String,
    pub file_id: Uuid,
    pub chunk_number: i32,
    pub etag: String,
    pub checksum: String,
    pub uploaded_chunks: i64,
    pub total_chunks: i64,
    /// File status after this chunk; COMPLETE when this request finalized the session.
    pub status: FileStatus,
}

impl StorageService {
    /// Open a session: provider multipart upload, PENDING record and placeholder chunks.
    #[tracing::instrument(skip(self, request), fields(
        owner_id = %request.owner_id,
        filename = %request.filename,
        size_bytes = request.total_size
    ))]
    pub async fn initiate_multipart_upload(
        &self,
        request: InitiateUpload,
    ) -> Result<MultipartSession, AppError> {
        let kind = resolve_kind(request.kind, &request.content_type, &request.filename)?;
        MediaValidator::for_kind(kind, &self.upload).validate_all(
            &request.filename,
            &request.content_type,
            request.total_size,
        )?;
        validate_user_metadata(&request.metadata)?;
        self.check_master(request.master_id, kind, request.owner_id)
            .await?;

        let chunk_size = self.upload.chunk_size_bytes;
        let total_chunks = request.total_size.div_ceil(chunk_size);
        if total_chunks > self.upload.max_chunk_count as u64 {
            return Err(AppError::InvalidInput(format!(
                "{} bytes needs {} chunks of {} bytes; at most {} are allowed",
                request.total_size, total_chunks, chunk_size, self.upload.max_chunk_count
            )));
        }

        let key = generate_object_key(kind, request.owner_id, &request.filename);
        let mut asset = self.new_asset(
            kind,
            &key,
            &request.filename,
            &request.content_type,
            request.total_size,
            request.owner_id,
            request.is_public,
            request.metadata,
            request.master_id,
        );
        asset.base_mut().processing_results = serde_json::json!({
            "multipart": {
                "chunkSize": chunk_size,
                "totalChunks": total_chunks,
            }
        });

        let options = object_options(&request.content_type, &asset.base().metadata, asset.id());
        let upload_id = self
            .storage
            .initiate_multipart_upload(&key, &options)
            .await?;

        let chunks = placeholder_chunks(
            asset.id(),
            &upload_id,
            &asset.base().storage_key,
            request.total_size,
            chunk_size,
            chrono::Duration::hours(self.upload.chunk_expiry_hours),
        );
        let expires_at = chunks
            .iter()
            .map(|c| c.expires_at)
            .min()
            .unwrap_or_else(Utc::now);

        if let Err(e) = self.persist_session(&asset, &upload_id, &chunks).await {
            tracing::error!(error = %e, upload_id = %upload_id, "Failed to record multipart session");
            if let Err(abort_err) = self.storage.abort_multipart_upload(&key, &upload_id).await {
                tracing::warn!(error = %abort_err, upload_id = %upload_id, "Failed to abort provider session");
            }
            return Err(e);
        }

        tracing::info!(
            upload_id = %upload_id,
            file_id = %asset.id(),
            total_chunks,
            chunk_size,
            "Multipart upload initiated"
        );

        Ok(MultipartSession {
            upload_id,
            file_id: asset.id(),
            kind,
            chunk_size,
            total_chunks: total_chunks as i32,
            total_size: request.total_size,
            expires_at,
        })
    }

    async fn persist_session(
        &self,
        asset: &FileAsset,
        upload_id: &str,
        chunks: &[cadence_core::models::FileChunk],
    ) -> Result<(), AppError> {
        self.files.create(asset, Some(upload_id)).await?;
        if let Err(e) = self.chunks.create_many(chunks).await {
            self.discard_record(asset.id()).await;
            return Err(e);
        }
        Ok(())
    }

    /// Store one chunk; the call that completes the set also finalizes.
    #[tracing::instrument(skip(self, data), fields(
        upload_id = %upload_id,
        chunk_number,
        size_bytes = data.len()
    ))]
    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_number: i32,
        data: Bytes,
        requester: Uuid,
    ) -> Result<ChunkReceipt, AppError> {
        let file = self.session_file(upload_id, requester).await?;
        if file.base().status != FileStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Upload {} is {}; chunks are no longer accepted",
                upload_id,
                file.base().status
            )));
        }

        let chunk = self
            .chunks
            .find_chunk(upload_id, chunk_number)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Chunk {} is not part of upload {}",
                    chunk_number, upload_id
                ))
            })?;
        if chunk.is_expired(Utc::now()) {
            return Err(AppError::InvalidState(format!(
                "Upload {} expired at {}",
                upload_id, chunk.expires_at
            )));
        }
        if data.len() as i64 != chunk.chunk_size {
            return Err(AppError::InvalidInput(format!(
                "Chunk {} of upload {}: expected {} bytes, got {}",
                chunk_number,
                upload_id,
                chunk.chunk_size,
                data.len()
            )));
        }

        let checksum = sha256_hex(&data);
        let size = data.len() as i64;
        let part = match self
            .storage
            .upload_part(&file.base().key, upload_id, chunk_number, data)
            .await
        {
            Ok(part) => part,
            Err(e) => {
                let message = format!(
                    "Chunk {} of upload {}: provider upload failed: {}",
                    chunk_number, upload_id, e
                );
                if let Err(mark_err) = self
                    .chunks
                    .mark_failed(upload_id, chunk_number, &e.to_string())
                    .await
                {
                    tracing::warn!(error = %mark_err, "Failed to record chunk failure");
                }
                tracing::error!(error = %e, upload_id = %upload_id, chunk_number, "Chunk upload failed");
                return Err(AppError::Storage(message));
            }
        };

        self.chunks
            .mark_uploaded(
                upload_id,
                chunk_number,
                &ChunkMetadata {
                    etag: Some(part.etag.clone()),
                    part_number: part.part_number,
                    size,
                    checksum: Some(checksum.clone()),
                },
            )
            .await?;

        let (uploaded, total) = self.chunks.count_uploaded(upload_id).await?;
        tracing::debug!(upload_id = %upload_id, chunk_number, uploaded, total, "Chunk stored");

        let status = if total > 0 && uploaded == total {
            self.finalize(upload_id).await?.base().status
        } else {
            FileStatus::Pending
        };

        Ok(ChunkReceipt {
            upload_id: upload_id.to_string(),
            file_id: file.id(),
            chunk_number,
            etag: part.etag,
            checksum,
            uploaded_chunks: uploaded,
            total_chunks: total,
            status,
        })
    }

    /// Assemble the session into the final object.
    ///
    /// Only the caller that moves the file PENDING -> PROCESSING assembles;
    /// everyone else gets the record as it currently stands.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub(crate) async fn finalize(&self, upload_id: &str) -> Result<FileAsset, AppError> {
        let file = self
            .files
            .find_by_upload_id(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)))?;

        let Some(claimed) = self
            .files
            .transition_status(file.id(), FileStatus::Pending, FileStatus::Processing)
            .await?
        else {
            tracing::debug!(upload_id = %upload_id, "Finalize already claimed by another request");
            return self.load(file.id()).await;
        };

        let start = std::time::Instant::now();
        match self.assemble(&claimed, upload_id).await {
            Ok(completed) => {
                tracing::info!(
                    upload_id = %upload_id,
                    file_id = %completed.id(),
                    size_bytes = completed.base().size,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Multipart upload finalized"
                );
                self.enqueue_validation(completed.id());
                Ok(completed)
            }
            Err(e) => {
                tracing::error!(error = %e, upload_id = %upload_id, file_id = %claimed.id(), "Finalize failed");
                self.fail_session(&claimed, upload_id).await;
                Err(e)
            }
        }
    }

    async fn assemble(&self, file: &FileAsset, upload_id: &str) -> Result<FileAsset, AppError> {
        let chunks = self.chunks.find_by_upload(upload_id).await?;
        if let Some(missing) = chunks.iter().find(|c| !c.uploaded) {
            return Err(AppError::InvalidState(format!(
                "Chunk {} of upload {} has not been uploaded",
                missing.chunk_number, upload_id
            )));
        }
        if chunks.is_empty() {
            return Err(AppError::InvalidState(format!(
                "Upload {} has no chunks",
                upload_id
            )));
        }

        let parts: Vec<CompletedPart> = chunks
            .iter()
            .map(|c| CompletedPart {
                part_number: c.chunk_number,
                etag: c.metadata.etag.clone().unwrap_or_default(),
            })
            .collect();

        let key = &file.base().key;
        let stored = self
            .storage
            .complete_multipart_upload(key, upload_id, &parts)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Combining upload {} failed: {}", upload_id, e))
            })?;

        let expected: i64 = chunks.iter().map(|c| c.chunk_size).sum();
        if stored.size as i64 != expected {
            return Err(AppError::Storage(format!(
                "Upload {} assembled {} bytes, expected {}",
                upload_id, stored.size, expected
            )));
        }

        let completed = self
            .files
            .mark_complete(file.id(), &stored.url, stored.size as i64)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(format!("File {} left PROCESSING during finalize", file.id()))
            })?;

        if let Err(e) = self.chunks.delete_by_upload(upload_id).await {
            tracing::warn!(error = %e, upload_id = %upload_id, "Failed to delete chunk rows after finalize");
        }
        Ok(completed)
    }

    /// Mark FAILED and release the provider side. Cleanup errors are logged.
    ///
    /// Chunk rows stay until they expire so the FAILED record remains
    /// reachable by the expired-session sweep.
    async fn fail_session(&self, file: &FileAsset, upload_id: &str) {
        let key = &file.base().key;
        if let Err(e) = self.storage.abort_multipart_upload(key, upload_id).await {
            tracing::warn!(error = %e, upload_id = %upload_id, "Failed to abort provider session");
        }
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(error = %e, key = %key, "Failed to remove partially combined object");
        }
        match self
            .files
            .transition_status(file.id(), FileStatus::Processing, FileStatus::Failed)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(file_id = %file.id(), "File was no longer PROCESSING when marking it FAILED")
            }
            Err(e) => tracing::error!(error = %e, file_id = %file.id(), "Failed to mark file FAILED"),
        }
    }

    /// Cancel a session that has not been finalized.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn abort_multipart_upload(
        &self,
        upload_id: &str,
        requester: Uuid,
    ) -> Result<(), AppError> {
        let file = self.session_file(upload_id, requester).await?;
        match file.base().status {
            FileStatus::Pending => {
                if self
                    .files
                    .transition_status(file.id(), FileStatus::Pending, FileStatus::Failed)
                    .await?
                    .is_none()
                {
                    return Err(AppError::InvalidState(format!(
                        "Upload {} is being finalized",
                        upload_id
                    )));
                }
            }
            FileStatus::Failed => {}
            other => {
                return Err(AppError::InvalidState(format!(
                    "Upload {} is {} and cannot be aborted",
                    upload_id, other
                )))
            }
        }

        self.release_session(&file, upload_id).await;
        tracing::info!(upload_id = %upload_id, file_id = %file.id(), "Multipart upload aborted");
        Ok(())
    }

    /// Provider abort, chunk rows and the never-completed file row.
    async fn release_session(&self, file: &FileAsset, upload_id: &str) {
        if let Err(e) = self
            .storage
            .abort_multipart_upload(&file.base().key, upload_id)
            .await
        {
            tracing::warn!(error = %e, upload_id = %upload_id, "Failed to abort provider session");
        }
        if let Err(e) = self.chunks.delete_by_upload(upload_id).await {
            tracing::warn!(error = %e, upload_id = %upload_id, "Failed to delete chunk rows");
        }
        self.discard_record(file.id()).await;
    }

    /// Reclaim a session whose chunks expired. Returns whether anything was released.
    ///
    /// A session in PROCESSING is left alone until it has sat there longer than
    /// the finalize grace period; after that its finalizer is presumed dead.
    #[tracing::instrument(skip(self), fields(upload_id = %session.upload_id, file_id = %session.file_id))]
    pub async fn reclaim_expired_session(
        &self,
        session: &ExpiredSession,
    ) -> Result<bool, AppError> {
        let Some(file) = self.files.find_by_id(session.file_id).await? else {
            self.chunks.delete_by_upload(&session.upload_id).await?;
            return Ok(true);
        };

        match file.base().status {
            FileStatus::Processing => {
                let stuck_for = (Utc::now() - file.base().updated_at).num_seconds();
                let grace = i64::try_from(self.upload.finalize_grace_secs).unwrap_or(i64::MAX);
                if stuck_for < grace {
                    tracing::debug!("Skipping expired session that is being finalized");
                    return Ok(false);
                }
                if self
                    .files
                    .transition_status(file.id(), FileStatus::Processing, FileStatus::Failed)
                    .await?
                    .is_none()
                {
                    return Ok(false);
                }
                tracing::warn!(
                    stuck_since = %file.base().updated_at,
                    "Reclaiming session abandoned during finalize"
                );
                let key = &file.base().key;
                if let Err(e) = self.storage.delete(key).await {
                    tracing::warn!(error = %e, key = %key, "Failed to remove partially combined object");
                }
                self.release_session(&file, &session.upload_id).await;
                Ok(true)
            }
            FileStatus::Pending => {
                if self
                    .files
                    .transition_status(file.id(), FileStatus::Pending, FileStatus::Failed)
                    .await?
                    .is_none()
                {
                    return Ok(false);
                }
                self.release_session(&file, &session.upload_id).await;
                Ok(true)
            }
            FileStatus::Failed => {
                self.release_session(&file, &session.upload_id).await;
                Ok(true)
            }
            FileStatus::Complete | FileStatus::Deleted => {
                self.chunks.delete_by_upload(&session.upload_id).await?;
                Ok(true)
            }
        }
    }

    /// Chunks uploaded so far and the file status.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn get_upload_progress(
        &self,
        upload_id: &str,
        requester: Uuid,
    ) -> Result<UploadProgress, AppError> {
        let file = self.session_file(upload_id, requester).await?;
        let chunks = self.chunks.find_by_upload(upload_id).await?;
        let base = file.base();
        let mut progress =
            UploadProgress::from_chunks(upload_id, file.id(), base.status, base.size, &chunks);

        if chunks.is_empty() {
            let planned = base.processing_results["multipart"]["totalChunks"]
                .as_i64()
                .unwrap_or(0) as i32;
            progress.total_chunks = planned;
            if base.status == FileStatus::Complete {
                progress.uploaded_chunks = planned;
                progress.uploaded_bytes = base.size;
            }
        }
        Ok(progress)
    }

    /// File record of a session, visible to its owner only.
    async fn session_file(&self, upload_id: &str, requester: Uuid) -> Result<FileAsset, AppError> {
        let file = self
            .files
            .find_by_upload_id(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)))?;
        if !file.base().is_owned_by(requester) {
            return Err(AppError::AccessDenied(format!(
                "Upload {} belongs to another account",
                upload_id
            )));
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{initiate_request, TestContext, MIB};
    use cadence_core::ErrorMetadata;
    use std::sync::Arc;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    fn chunk_of(data: &[u8], chunk_size: usize, n: i32) -> Bytes {
        let start = (n as usize - 1) * chunk_size;
        let end = (start + chunk_size).min(data.len());
        Bytes::copy_from_slice(&data[start..end])
    }

    #[tokio::test]
    async fn test_twelve_mib_out_of_order_scenario() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let data = payload(12 * MIB);

        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "album.wav", data.len() as u64))
            .await
            .unwrap();
        assert_eq!(session.total_chunks, 3);
        assert_eq!(session.chunk_size, 5 * MIB as u64);

        let chunks = ctx.repos.chunks.find_by_upload(&session.upload_id).await.unwrap();
        let sizes: Vec<i64> = chunks.iter().map(|c| c.chunk_size).collect();
        assert_eq!(sizes, vec![5 * MIB as i64, 5 * MIB as i64, 2 * MIB as i64]);

        for n in [2, 1] {
            let receipt = ctx
                .service
                .upload_chunk(&session.upload_id, n, chunk_of(&data, 5 * MIB, n), owner)
                .await
                .unwrap();
            assert_eq!(receipt.status, FileStatus::Pending);
        }
        let pending = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(pending.base().status, FileStatus::Pending);

        let receipt = ctx
            .service
            .upload_chunk(&session.upload_id, 3, chunk_of(&data, 5 * MIB, 3), owner)
            .await
            .unwrap();
        assert_eq!(receipt.status, FileStatus::Complete);
        assert_eq!(receipt.uploaded_chunks, 3);

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Complete);
        assert_eq!(file.base().size, data.len() as i64);
        assert!(ctx
            .repos
            .chunks
            .find_by_upload(&session.upload_id)
            .await
            .unwrap()
            .is_empty());

        let downloaded = ctx.service.download(session.file_id, owner).await.unwrap();
        assert!(downloaded.as_ref() == data.as_slice());

        let progress = ctx
            .service
            .get_upload_progress(&session.upload_id, owner)
            .await
            .unwrap();
        assert_eq!(progress.total_chunks, 3);
        assert_eq!(progress.uploaded_chunks, 3);
        assert!(progress.missing_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_reassembly_uses_chunk_number_for_any_arrival_order() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let data = payload(4 * 1024 + 100);

        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "mix.wav", data.len() as u64))
            .await
            .unwrap();
        assert_eq!(session.total_chunks, 5);

        for n in [5, 3, 1, 4, 2] {
            ctx.service
                .upload_chunk(&session.upload_id, n, chunk_of(&data, 1024, n), owner)
                .await
                .unwrap();
        }

        let downloaded = ctx.service.download(session.file_id, owner).await.unwrap();
        assert_eq!(downloaded.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_concurrent_finalize_completes_exactly_once() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let data = payload(3 * 1024);

        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "loop.wav", data.len() as u64))
            .await
            .unwrap();

        // Mark every chunk uploaded without triggering finalize.
        for n in 1..=3 {
            let part = ctx
                .service
                .provider()
                .upload_part(
                    &ctx.repos
                        .files
                        .find_by_id(session.file_id)
                        .await
                        .unwrap()
                        .unwrap()
                        .base()
                        .key,
                    &session.upload_id,
                    n,
                    chunk_of(&data, 1024, n),
                )
                .await
                .unwrap();
            ctx.repos
                .chunks
                .mark_uploaded(
                    &session.upload_id,
                    n,
                    &ChunkMetadata {
                        etag: Some(part.etag),
                        part_number: n,
                        size: 1024,
                        checksum: None,
                    },
                )
                .await
                .unwrap();
        }

        let service = Arc::new(ctx.service.clone());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            let upload_id = session.upload_id.clone();
            handles.push(tokio::spawn(async move { service.finalize(&upload_id).await }));
        }
        let mut completed = 0;
        for handle in handles {
            let file = handle.await.unwrap().unwrap();
            if file.base().status == FileStatus::Complete {
                completed += 1;
            }
        }
        assert!(completed >= 1);

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Complete);
        let downloaded = ctx.service.download(session.file_id, owner).await.unwrap();
        assert_eq!(downloaded.as_ref(), data.as_slice());
        let listed = ctx
            .service
            .provider()
            .list(&format!("audio/{}", owner))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_last_chunks_finalize_once() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let data = payload(4 * 1024);
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "race.wav", data.len() as u64))
            .await
            .unwrap();

        let service = Arc::new(ctx.service.clone());
        let mut handles = Vec::new();
        for n in 1..=4 {
            let service = service.clone();
            let upload_id = session.upload_id.clone();
            let chunk = chunk_of(&data, 1024, n);
            handles.push(tokio::spawn(async move {
                service.upload_chunk(&upload_id, n, chunk, owner).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Complete);
        let downloaded = ctx.service.download(session.file_id, owner).await.unwrap();
        assert_eq!(downloaded.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_chunk_after_finalize_is_a_state_error() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let data = payload(1024);
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "one.wav", 1024))
            .await
            .unwrap();
        ctx.service
            .upload_chunk(&session.upload_id, 1, Bytes::from(data.clone()), owner)
            .await
            .unwrap();

        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 1, Bytes::from(data), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(err.http_status_code(), 409);
    }

    #[tokio::test]
    async fn test_chunk_validation_errors_name_the_chunk() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "two.wav", 2048))
            .await
            .unwrap();

        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 2, Bytes::from(vec![0u8; 10]), owner)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Chunk 2"));

        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 7, Bytes::from(vec![0u8; 1024]), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 1, Bytes::from(vec![0u8; 1024]), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));

        let err = ctx
            .service
            .upload_chunk("no-such-upload", 1, Bytes::from(vec![0u8; 1024]), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_abort_releases_everything() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "drop.wav", 3000))
            .await
            .unwrap();
        ctx.service
            .upload_chunk(&session.upload_id, 1, Bytes::from(vec![1u8; 1024]), owner)
            .await
            .unwrap();

        ctx.service
            .abort_multipart_upload(&session.upload_id, owner)
            .await
            .unwrap();

        assert!(ctx.repos.files.find_by_id(session.file_id).await.unwrap().is_none());
        assert!(ctx
            .repos
            .chunks
            .find_by_upload(&session.upload_id)
            .await
            .unwrap()
            .is_empty());
        assert!(ctx.multipart_dir_is_empty());

        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 2, Bytes::from(vec![1u8; 1024]), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finalize_failure_marks_file_failed() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "broken.wav", 2048))
            .await
            .unwrap();

        // Chunk rows claim success but the provider never received part 2.
        ctx.service
            .upload_chunk(&session.upload_id, 1, Bytes::from(vec![1u8; 1024]), owner)
            .await
            .unwrap();
        ctx.repos
            .chunks
            .mark_uploaded(
                &session.upload_id,
                2,
                &ChunkMetadata {
                    etag: Some("bogus".to_string()),
                    part_number: 2,
                    size: 1024,
                    checksum: None,
                },
            )
            .await
            .unwrap();

        let err = ctx.service.finalize(&session.upload_id).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Failed);
        assert!(!ctx
            .service
            .provider()
            .exists(&file.base().key)
            .await
            .unwrap());
        assert!(ctx.multipart_dir_is_empty());

        let err = ctx.service.get_signed_url(session.file_id, owner).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_initiate_rejects_too_many_chunks() {
        let ctx = TestContext::with_chunk_size(1024).await;
        let owner = Uuid::new_v4();
        let err = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "huge.wav", 1024 * 20_000))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(ctx.multipart_dir_is_empty());
    }
}
