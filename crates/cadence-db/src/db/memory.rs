//! In-memory repositories
//!
//! Selected with `DATABASE_URL=memory://`. Every compare-and-set runs under a
//! single write lock, giving the same serialization the SQL `WHERE status = $from`
//! guards give in PostgreSQL.

use async_trait::async_trait;
use cadence_core::models::{
    ChunkMetadata, FileAsset, FileChunk, FileKind, FileStatus, TechnicalMetadata,
    ValidationStatus,
};
use cadence_core::AppError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::{ChunkRepository, ExpiredSession, FileRepository};

struct StoredFile {
    asset: FileAsset,
    upload_id: Option<String>,
}

#[derive(Default)]
pub struct MemoryFileRepository {
    files: RwLock<HashMap<Uuid, StoredFile>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to the stored record and return the updated copy.
    async fn update<F>(&self, id: Uuid, f: F) -> Result<FileAsset, AppError>
    where
        F: FnOnce(&mut FileAsset) + Send,
    {
        let mut files = self.files.write().await;
        let stored = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        f(&mut stored.asset);
        stored.asset.base_mut().updated_at = Utc::now();
        Ok(stored.asset.clone())
    }

    /// Like `update`, but only when `guard` holds; `None` otherwise.
    async fn update_if<G, F>(&self, id: Uuid, guard: G, f: F) -> Result<Option<FileAsset>, AppError>
    where
        G: FnOnce(&FileAsset) -> bool + Send,
        F: FnOnce(&mut FileAsset) + Send,
    {
        let mut files = self.files.write().await;
        let stored = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        if !guard(&stored.asset) {
            return Ok(None);
        }
        f(&mut stored.asset);
        stored.asset.base_mut().updated_at = Utc::now();
        Ok(Some(stored.asset.clone()))
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn create(
        &self,
        file: &FileAsset,
        upload_id: Option<&str>,
    ) -> Result<FileAsset, AppError> {
        let mut files = self.files.write().await;
        if files.contains_key(&file.id()) {
            return Err(AppError::InvalidState(format!(
                "File {} already exists",
                file.id()
            )));
        }
        if files
            .values()
            .any(|f| f.asset.base().storage_key == file.base().storage_key)
        {
            return Err(AppError::InvalidState(format!(
                "Storage key {} already in use",
                file.base().storage_key
            )));
        }
        if let Some(upload_id) = upload_id {
            if files
                .values()
                .any(|f| f.upload_id.as_deref() == Some(upload_id))
            {
                return Err(AppError::InvalidState(format!(
                    "Upload {} already has a file",
                    upload_id
                )));
            }
        }
        files.insert(
            file.id(),
            StoredFile {
                asset: file.clone(),
                upload_id: upload_id.map(str::to_string),
            },
        );
        Ok(file.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        Ok(self.files.read().await.get(&id).map(|f| f.asset.clone()))
    }

    async fn find_kind(&self, id: Uuid) -> Result<Option<FileKind>, AppError> {
        Ok(self.files.read().await.get(&id).map(|f| f.asset.kind()))
    }

    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<FileAsset>, AppError> {
        Ok(self
            .files
            .read()
            .await
            .values()
            .find(|f| f.upload_id.as_deref() == Some(upload_id))
            .map(|f| f.asset.clone()))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: FileStatus,
        to: FileStatus,
    ) -> Result<Option<FileAsset>, AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "Illegal status transition {} -> {}",
                from, to
            )));
        }
        self.update_if(
            id,
            |asset| asset.base().status == from,
            |asset| asset.base_mut().status = to,
        )
        .await
    }

    async fn mark_complete(
        &self,
        id: Uuid,
        path: &str,
        size: i64,
    ) -> Result<Option<FileAsset>, AppError> {
        let path = path.to_string();
        self.update_if(
            id,
            |asset| asset.base().status == FileStatus::Processing,
            move |asset| {
                let base = asset.base_mut();
                base.status = FileStatus::Complete;
                base.path = path;
                base.size = size;
            },
        )
        .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        self.update_if(
            id,
            |asset| asset.base().status == FileStatus::Complete,
            |asset| {
                let base = asset.base_mut();
                base.status = FileStatus::Deleted;
                base.deleted_at = Some(Utc::now());
            },
        )
        .await
    }

    async fn update_location(
        &self,
        id: Uuid,
        key: &str,
        filename: &str,
        path: &str,
    ) -> Result<FileAsset, AppError> {
        let (key, filename, path) = (key.to_string(), filename.to_string(), path.to_string());
        self.update(id, move |asset| {
            let base = asset.base_mut();
            base.key = key;
            base.filename = filename;
            base.path = path;
        })
        .await
    }

    async fn merge_metadata(
        &self,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> Result<FileAsset, AppError> {
        let patch = patch.clone();
        self.update(id, move |asset| {
            let metadata = &mut asset.base_mut().metadata;
            if !metadata.is_object() {
                *metadata = serde_json::json!({});
            }
            if let (Some(target), serde_json::Value::Object(entries)) =
                (metadata.as_object_mut(), patch)
            {
                target.extend(entries);
            }
        })
        .await
    }

    async fn record_access(&self, id: Uuid) -> Result<FileAsset, AppError> {
        let mut files = self.files.write().await;
        let stored = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        let base = stored.asset.base_mut();
        base.last_accessed_at = Some(Utc::now());
        base.download_count += 1;
        Ok(stored.asset.clone())
    }

    async fn claim_validation(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        self.update_if(
            id,
            |asset| {
                asset.base().status == FileStatus::Complete
                    && asset.base().validation_status == ValidationStatus::Pending
            },
            |asset| asset.base_mut().validation_status = ValidationStatus::InProgress,
        )
        .await
    }

    async fn finish_validation(
        &self,
        id: Uuid,
        status: ValidationStatus,
        results: &serde_json::Value,
        technical: Option<&TechnicalMetadata>,
    ) -> Result<Option<FileAsset>, AppError> {
        let mut files = self.files.write().await;
        let stored = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        if stored.asset.base().validation_status != ValidationStatus::InProgress {
            return Ok(None);
        }
        if let Some(technical) = technical {
            if !stored.asset.apply_technical(technical.clone()) {
                return Err(AppError::InvalidInput(format!(
                    "Technical metadata for {} does not fit {} file {}",
                    technical.kind(),
                    stored.asset.kind(),
                    id
                )));
            }
        }
        let base = stored.asset.base_mut();
        base.validation_status = status;
        base.validation_results = results.clone();
        base.updated_at = Utc::now();
        Ok(Some(stored.asset.clone()))
    }

    async fn reset_stale_validations(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut files = self.files.write().await;
        let mut reset = Vec::new();
        for stored in files.values_mut() {
            let base = stored.asset.base_mut();
            if base.validation_status == ValidationStatus::InProgress
                && base.updated_at < stale_before
            {
                base.validation_status = ValidationStatus::Pending;
                base.updated_at = Utc::now();
                reset.push(base.id);
            }
        }
        Ok(reset)
    }

    async fn list_versions(&self, master_id: Uuid) -> Result<Vec<FileAsset>, AppError> {
        let files = self.files.read().await;
        let mut versions: Vec<FileAsset> = files
            .values()
            .map(|f| &f.asset)
            .filter(|a| a.master_id() == Some(master_id) && a.base().status != FileStatus::Deleted)
            .cloned()
            .collect();
        versions.sort_by_key(|a| a.base().created_at);
        Ok(versions)
    }

    async fn list_awaiting_validation(&self, limit: i64) -> Result<Vec<Uuid>, AppError> {
        let files = self.files.read().await;
        let mut awaiting: Vec<&FileAsset> = files
            .values()
            .map(|f| &f.asset)
            .filter(|a| {
                a.base().status == FileStatus::Complete
                    && a.base().validation_status == ValidationStatus::Pending
            })
            .collect();
        awaiting.sort_by_key(|a| a.base().created_at);
        Ok(awaiting
            .into_iter()
            .take(limit.max(0) as usize)
            .map(FileAsset::id)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.files.write().await.remove(&id).is_some())
    }
}

/// Chunks keyed by `(upload_id, chunk_number)`, so iteration is already ordered.
#[derive(Default)]
pub struct MemoryChunkRepository {
    chunks: RwLock<BTreeMap<(String, i32), FileChunk>>,
}

impl MemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkRepository for MemoryChunkRepository {
    async fn create_many(&self, chunks: &[FileChunk]) -> Result<(), AppError> {
        let mut stored = self.chunks.write().await;
        if let Some(existing) = chunks
            .iter()
            .find(|c| stored.contains_key(&(c.upload_id.clone(), c.chunk_number)))
        {
            return Err(AppError::InvalidState(format!(
                "Chunk {} of upload {} already exists",
                existing.chunk_number, existing.upload_id
            )));
        }
        for chunk in chunks {
            stored.insert((chunk.upload_id.clone(), chunk.chunk_number), chunk.clone());
        }
        Ok(())
    }

    async fn find_by_upload(&self, upload_id: &str) -> Result<Vec<FileChunk>, AppError> {
        Ok(self
            .chunks
            .read()
            .await
            .values()
            .filter(|c| c.upload_id == upload_id)
            .cloned()
            .collect())
    }

    async fn find_chunk(
        &self,
        upload_id: &str,
        chunk_number: i32,
    ) -> Result<Option<FileChunk>, AppError> {
        Ok(self
            .chunks
            .read()
            .await
            .get(&(upload_id.to_string(), chunk_number))
            .cloned())
    }

    async fn mark_uploaded(
        &self,
        upload_id: &str,
        chunk_number: i32,
        metadata: &ChunkMetadata,
    ) -> Result<FileChunk, AppError> {
        let mut chunks = self.chunks.write().await;
        let chunk = chunks
            .get_mut(&(upload_id.to_string(), chunk_number))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Chunk {} of upload {} not found",
                    chunk_number, upload_id
                ))
            })?;
        chunk.uploaded = true;
        chunk.error = None;
        chunk.metadata = metadata.clone();
        chunk.updated_at = Utc::now();
        Ok(chunk.clone())
    }

    async fn mark_failed(
        &self,
        upload_id: &str,
        chunk_number: i32,
        error: &str,
    ) -> Result<(), AppError> {
        if let Some(chunk) = self
            .chunks
            .write()
            .await
            .get_mut(&(upload_id.to_string(), chunk_number))
        {
            chunk.uploaded = false;
            chunk.error = Some(error.to_string());
            chunk.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_uploaded(&self, upload_id: &str) -> Result<(i64, i64), AppError> {
        let chunks = self.chunks.read().await;
        let session: Vec<&FileChunk> = chunks.values().filter(|c| c.upload_id == upload_id).collect();
        let uploaded = session.iter().filter(|c| c.uploaded).count() as i64;
        Ok((uploaded, session.len() as i64))
    }

    async fn delete_by_upload(&self, upload_id: &str) -> Result<u64, AppError> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|(id, _), _| id != upload_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn find_expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredSession>, AppError> {
        let chunks = self.chunks.read().await;
        let mut earliest: BTreeMap<(String, Uuid), DateTime<Utc>> = BTreeMap::new();
        for chunk in chunks.values() {
            let entry = earliest
                .entry((chunk.upload_id.clone(), chunk.file_id))
                .or_insert(chunk.expires_at);
            if chunk.expires_at < *entry {
                *entry = chunk.expires_at;
            }
        }
        let mut expired: Vec<((String, Uuid), DateTime<Utc>)> = earliest
            .into_iter()
            .filter(|(_, expires_at)| *expires_at <= now)
            .collect();
        expired.sort_by_key(|(_, expires_at)| *expires_at);
        Ok(expired
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|((upload_id, file_id), _)| ExpiredSession { upload_id, file_id })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::models::{placeholder_chunks, FileBase, NewFile};
    use std::sync::Arc;

    fn audio_asset(owner: Uuid) -> FileAsset {
        let base = FileBase::new(NewFile {
            original_filename: "track.wav".to_string(),
            mime_type: "audio/wav".to_string(),
            size: 10,
            bucket: "local".to_string(),
            key: format!("audio/{}/x/track.wav", owner),
            owner_id: owner,
            is_public: false,
            metadata: serde_json::json!({"genre": "ambient"}),
        });
        FileAsset::from_parts(
            base,
            TechnicalMetadata::zeroed(FileKind::Audio, "audio/wav", "track.wav"),
            None,
        )
    }

    #[tokio::test]
    async fn test_status_cas_has_single_winner() {
        let repo = Arc::new(MemoryFileRepository::new());
        let file = repo.create(&audio_asset(Uuid::new_v4()), Some("up-1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let id = file.id();
            handles.push(tokio::spawn(async move {
                repo.transition_status(id, FileStatus::Pending, FileStatus::Processing)
                    .await
                    .unwrap()
                    .is_some()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let found = repo.find_by_upload_id("up-1").await.unwrap().unwrap();
        assert_eq!(found.base().status, FileStatus::Processing);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let repo = MemoryFileRepository::new();
        let file = repo.create(&audio_asset(Uuid::new_v4()), None).await.unwrap();
        let result = repo
            .transition_status(file.id(), FileStatus::Pending, FileStatus::Complete)
            .await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_merge_metadata_and_access_counters() {
        let repo = MemoryFileRepository::new();
        let file = repo.create(&audio_asset(Uuid::new_v4()), None).await.unwrap();

        let merged = repo
            .merge_metadata(file.id(), &serde_json::json!({"bpm": 120}))
            .await
            .unwrap();
        assert_eq!(merged.base().metadata["genre"], "ambient");
        assert_eq!(merged.base().metadata["bpm"], 120);

        repo.record_access(file.id()).await.unwrap();
        let accessed = repo.record_access(file.id()).await.unwrap();
        assert_eq!(accessed.base().download_count, 2);
        assert!(accessed.base().last_accessed_at.is_some());
    }

    async fn complete_file(repo: &MemoryFileRepository) -> FileAsset {
        let file = repo.create(&audio_asset(Uuid::new_v4()), None).await.unwrap();
        repo.transition_status(file.id(), FileStatus::Pending, FileStatus::Processing)
            .await
            .unwrap();
        repo.mark_complete(file.id(), "/tmp/track.wav", 10)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_validation_claim_only_from_pending() {
        let repo = MemoryFileRepository::new();
        let file = complete_file(&repo).await;

        let claimed = repo.claim_validation(file.id()).await.unwrap().unwrap();
        assert_eq!(claimed.base().validation_status, ValidationStatus::InProgress);
        assert!(repo.claim_validation(file.id()).await.unwrap().is_none());
        assert!(repo.list_awaiting_validation(10).await.unwrap().is_empty());

        let done = repo
            .finish_validation(file.id(), ValidationStatus::Passed, &serde_json::json!({}), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.base().validation_status, ValidationStatus::Passed);

        // A late second result does not overwrite the first.
        let late = repo
            .finish_validation(file.id(), ValidationStatus::Failed, &serde_json::json!({}), None)
            .await
            .unwrap();
        assert!(late.is_none());
        let stored = repo.find_by_id(file.id()).await.unwrap().unwrap();
        assert_eq!(stored.base().validation_status, ValidationStatus::Passed);
    }

    #[tokio::test]
    async fn test_stale_validation_runs_return_to_pending() {
        let repo = MemoryFileRepository::new();
        let file = complete_file(&repo).await;
        repo.claim_validation(file.id()).await.unwrap().unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert!(repo.reset_stale_validations(cutoff).await.unwrap().is_empty());

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(repo.reset_stale_validations(cutoff).await.unwrap(), vec![file.id()]);
        assert_eq!(repo.list_awaiting_validation(10).await.unwrap(), vec![file.id()]);
    }

    #[tokio::test]
    async fn test_finish_validation_rejects_foreign_kind() {
        let repo = MemoryFileRepository::new();
        let file = complete_file(&repo).await;
        repo.claim_validation(file.id()).await.unwrap().unwrap();
        let image = TechnicalMetadata::zeroed(FileKind::Image, "image/png", "a.png");
        let result = repo
            .finish_validation(file.id(), ValidationStatus::Passed, &serde_json::json!({}), Some(&image))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_chunk_rows_ordered_and_expired_sessions_found() {
        let repo = MemoryChunkRepository::new();
        let file_id = Uuid::new_v4();
        let chunks = placeholder_chunks(file_id, "up-2", "k", 12, 5, chrono::Duration::hours(-1));
        repo.create_many(&chunks).await.unwrap();
        assert!(repo.create_many(&chunks[..1]).await.is_err());

        repo.mark_uploaded(
            "up-2",
            2,
            &ChunkMetadata {
                part_number: 2,
                size: 5,
                ..ChunkMetadata::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.count_uploaded("up-2").await.unwrap(), (1, 3));

        let ordered: Vec<i32> = repo
            .find_by_upload("up-2")
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_number)
            .collect();
        assert_eq!(ordered, vec![1, 2, 3]);

        let expired = repo.find_expired_sessions(Utc::now(), 10).await.unwrap();
        assert_eq!(
            expired,
            vec![ExpiredSession {
                upload_id: "up-2".to_string(),
                file_id
            }]
        );

        assert_eq!(repo.delete_by_upload("up-2").await.unwrap(), 3);
        assert!(repo.find_by_upload("up-2").await.unwrap().is_empty());
    }
}
