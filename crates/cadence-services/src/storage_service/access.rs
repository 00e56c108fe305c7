use bytes::Bytes;
use cadence_core::models::{FileAsset, FileBase, FileStatus, NewFile, ValidationStatus};
use cadence_core::validation::validate_user_metadata;
use cadence_core::AppError;
use cadence_storage::keys::{derive_copy_key, sibling_key};
use cadence_storage::{ByteStream, SignedUrl};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{require_complete, string_map, StorageService};

/// Record metadata merged with what the provider reports for the object.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileMetadata {
    pub file_id: Uuid,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub content_type: String,
    pub size: i64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageService {
    /// Time-limited retrieval reference for a COMPLETE file.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn get_signed_url(&self, id: Uuid, requester: Uuid) -> Result<SignedUrl, AppError> {
        let file = self.load_accessible(id, requester).await?;
        require_complete(&file)?;
        let signed = self
            .storage
            .get_signed_url(&file.base().key, self.signed_url_ttl)
            .await?;
        if !signed.is_network_safe() {
            tracing::warn!(file_id = %id, "Backend cannot sign URLs; returning a local reference");
        }
        self.touch(id).await;
        Ok(signed)
    }

    /// Whole object in memory.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn download(&self, id: Uuid, requester: Uuid) -> Result<Bytes, AppError> {
        let file = self.load_accessible(id, requester).await?;
        require_complete(&file)?;
        let data = self.storage.download(&file.base().key).await?;
        self.touch(id).await;
        Ok(data)
    }

    /// Streamed object body together with its record.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn download_stream(
        &self,
        id: Uuid,
        requester: Uuid,
    ) -> Result<(FileAsset, ByteStream), AppError> {
        let file = self.load_accessible(id, requester).await?;
        require_complete(&file)?;
        let stream = self.storage.download_stream(&file.base().key).await?;
        self.touch(id).await;
        Ok((file, stream))
    }

    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn get_file_metadata(
        &self,
        id: Uuid,
        requester: Uuid,
    ) -> Result<FileMetadata, AppError> {
        let file = self.load_accessible(id, requester).await?;
        require_complete(&file)?;
        let base = file.base();
        let object = self.storage.get_metadata(&base.key).await?;

        Ok(FileMetadata {
            file_id: id,
            metadata: base.metadata.clone(),
            content_type: object
                .content_type
                .unwrap_or_else(|| base.mime_type.clone()),
            size: object.size as i64,
            etag: object.etag,
            last_modified: object.last_modified,
        })
    }

    /// Shallow-merge `patch` into the user metadata.
    ///
    /// The provider copy is written first; the record is only updated once the
    /// object agrees with it.
    #[tracing::instrument(skip(self, patch), fields(file_id = %id))]
    pub async fn update_file_metadata(
        &self,
        id: Uuid,
        patch: serde_json::Value,
        requester: Uuid,
    ) -> Result<FileAsset, AppError> {
        if !patch.is_object() {
            return Err(AppError::InvalidInput(
                "Metadata patch must be a JSON object".to_string(),
            ));
        }
        let file = self.load_owned(id, requester).await?;

        let mut merged = file.base().metadata.clone();
        if let (Some(target), Some(entries)) = (merged.as_object_mut(), patch.as_object()) {
            target.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        validate_user_metadata(&merged)?;

        if file.base().status == FileStatus::Complete {
            let mut object_metadata = string_map(&merged);
            object_metadata.insert("cadence-file-id".to_string(), id.to_string());
            self.storage
                .update_metadata(&file.base().key, object_metadata)
                .await?;
        }

        let updated = self.files.merge_metadata(id, &patch).await?;
        tracing::info!(file_id = %id, keys = patch.as_object().map(|m| m.len()).unwrap_or(0), "File metadata updated");
        Ok(updated)
    }

    /// Soft-delete the record, then remove the object.
    ///
    /// Once the record is DELETED the file is gone for callers; a provider
    /// failure only leaves an orphaned object behind.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn delete_file(&self, id: Uuid, requester: Uuid) -> Result<(), AppError> {
        let file = self.load_owned(id, requester).await?;
        require_complete(&file)?;

        let deleted = self.files.soft_delete(id).await?.ok_or_else(|| {
            AppError::InvalidState(format!("File {} changed state during delete", id))
        })?;

        if let Err(e) = self.storage.delete_object(&deleted.base().key).await {
            tracing::error!(
                error = %e,
                file_id = %id,
                key = %deleted.base().key,
                "Failed to remove object of deleted file"
            );
        }

        tracing::info!(file_id = %id, "File deleted");
        Ok(())
    }

    /// Duplicate a readable file into a new record owned by the requester.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn copy_file(
        &self,
        id: Uuid,
        requester: Uuid,
        new_filename: Option<String>,
    ) -> Result<FileAsset, AppError> {
        let source = self.load_accessible(id, requester).await?;
        require_complete(&source)?;
        let src = source.base();
        let kind = source.kind();

        let name = new_filename.unwrap_or_else(|| src.original_filename.clone());
        let key = derive_copy_key(kind, requester, &name);

        let mut base = FileBase::new(NewFile {
            original_filename: name,
            mime_type: src.mime_type.clone(),
            size: src.size,
            bucket: self.bucket.clone(),
            key: key.clone(),
            owner_id: requester,
            is_public: false,
            metadata: src.metadata.clone(),
        });
        base.status = FileStatus::Processing;
        let validated = src.validation_status.is_finished();
        if validated {
            base.validation_status = src.validation_status;
            base.validation_results = src.validation_results.clone();
        }
        let copy = FileAsset::from_parts(base, source.technical(), None);
        let copy = self.files.create(&copy, None).await?;
        let copy_id = copy.id();

        let stored = match self.storage.copy(&src.key, &key).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = %e, source = %src.key, "Provider copy failed");
                self.discard_record(copy_id).await;
                return Err(e.into());
            }
        };

        let completed = match self
            .files
            .mark_complete(copy_id, &stored.url, stored.size as i64)
            .await
        {
            Ok(Some(file)) => file,
            outcome => {
                if let Err(e) = self.storage.delete(&key).await {
                    tracing::warn!(error = %e, key = %key, "Failed to remove copied object");
                }
                self.discard_record(copy_id).await;
                return Err(outcome.err().unwrap_or_else(|| {
                    AppError::InvalidState(format!("Copy {} left PROCESSING early", copy_id))
                }));
            }
        };

        tracing::info!(source_id = %id, file_id = %copy_id, key = %key, "File copied");
        if !validated {
            self.enqueue_validation(copy_id);
        }
        Ok(completed)
    }

    /// Rename the object within its directory.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn move_file(
        &self,
        id: Uuid,
        new_filename: &str,
        requester: Uuid,
    ) -> Result<FileAsset, AppError> {
        let file = self.load_owned(id, requester).await?;
        require_complete(&file)?;
        let old_key = file.base().key.clone();
        let new_key = sibling_key(&old_key, new_filename);
        if new_key == old_key {
            return Ok(file);
        }

        let stored = self.storage.move_object(&old_key, &new_key).await?;
        let filename = new_key.rsplit('/').next().unwrap_or(&new_key).to_string();

        match self
            .files
            .update_location(id, &new_key, &filename, &stored.url)
            .await
        {
            Ok(moved) => {
                tracing::info!(file_id = %id, from = %old_key, to = %new_key, "File moved");
                Ok(moved)
            }
            Err(e) => {
                tracing::error!(error = %e, file_id = %id, "Failed to record move; moving object back");
                if let Err(revert) = self.storage.move_object(&new_key, &old_key).await {
                    tracing::error!(error = %revert, file_id = %id, key = %new_key, "Failed to move object back");
                }
                Err(e)
            }
        }
    }

    /// Access stamps are best effort.
    async fn touch(&self, id: Uuid) {
        if let Err(e) = self.files.record_access(id).await {
            tracing::warn!(error = %e, file_id = %id, "Failed to record file access");
        }
    }

    /// Validation status of a readable file.
    pub async fn validation_status(
        &self,
        id: Uuid,
        requester: Uuid,
    ) -> Result<ValidationStatus, AppError> {
        Ok(self
            .load_accessible(id, requester)
            .await?
            .base()
            .validation_status)
    }
}
