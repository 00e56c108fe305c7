//! Storage service
//!
//! Every caller-facing file operation goes through [`StorageService`]: it
//! authorizes the requester against the record, checks the record's status and
//! only then delegates to the provider. The database record is authoritative
//! for existence and ownership.

mod access;
mod multipart;
mod upload;

use bytes::Bytes;
use cadence_core::models::{
    FileAsset, FileBase, FileKind, FileStatus, NewFile, TechnicalMetadata,
};
use cadence_core::{AppError, Config, UploadConfig};
use cadence_db::{ChunkRepository, FileRepository, Repositories};
use cadence_storage::{StorageProvider, UploadOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::validation::ValidationQueue;

pub use access::FileMetadata;
pub use multipart::{ChunkReceipt, InitiateUpload, MultipartSession};
pub use upload::UploadRequest;

#[derive(Clone)]
pub struct StorageService {
    storage: Arc<dyn StorageProvider>,
    files: Arc<dyn FileRepository>,
    chunks: Arc<dyn ChunkRepository>,
    upload: UploadConfig,
    bucket: String,
    signed_url_ttl: Duration,
    validation: Option<ValidationQueue>,
}

impl StorageService {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        repositories: &Repositories,
        config: &Config,
    ) -> Self {
        Self {
            storage,
            files: repositories.files.clone(),
            chunks: repositories.chunks.clone(),
            upload: config.upload.clone(),
            bucket: config.storage.bucket_name().to_string(),
            signed_url_ttl: Duration::from_secs(config.storage.signed_url_ttl_secs),
            validation: None,
        }
    }

    /// Hand completed files to the validation pipeline.
    pub fn with_validation_queue(mut self, queue: ValidationQueue) -> Self {
        self.validation = Some(queue);
        self
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    pub fn upload_config(&self) -> &UploadConfig {
        &self.upload
    }

    /// Kind-agnostic lookup through the id index.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn get_file(&self, id: Uuid, requester: Uuid) -> Result<FileAsset, AppError> {
        self.load_accessible(id, requester).await
    }

    /// Non-deleted versions of `master_id` the requester may see.
    #[tracing::instrument(skip(self), fields(file_id = %master_id))]
    pub async fn list_versions(
        &self,
        master_id: Uuid,
        requester: Uuid,
    ) -> Result<Vec<FileAsset>, AppError> {
        self.load_accessible(master_id, requester).await?;
        let versions = self.files.list_versions(master_id).await?;
        Ok(versions
            .into_iter()
            .filter(|v| v.base().is_accessible_by(requester))
            .collect())
    }

    /// Record that exists and is not soft-deleted.
    pub(crate) async fn load(&self, id: Uuid) -> Result<FileAsset, AppError> {
        match self.files.find_by_id(id).await? {
            Some(file) if !file.base().is_deleted() => Ok(file),
            _ => Err(AppError::NotFound(format!("File {} not found", id))),
        }
    }

    /// Owner match or public visibility.
    pub(crate) async fn load_accessible(
        &self,
        id: Uuid,
        requester: Uuid,
    ) -> Result<FileAsset, AppError> {
        let file = self.load(id).await?;
        if !file.base().is_accessible_by(requester) {
            tracing::debug!(file_id = %id, requester = %requester, "Access denied to private file");
            return Err(AppError::AccessDenied(format!(
                "File {} is private to its owner",
                id
            )));
        }
        Ok(file)
    }

    /// Mutations are reserved to the owner, even on public files.
    pub(crate) async fn load_owned(&self, id: Uuid, requester: Uuid) -> Result<FileAsset, AppError> {
        let file = self.load(id).await?;
        if !file.base().is_owned_by(requester) {
            return Err(AppError::AccessDenied(format!(
                "Only the owner can modify file {}",
                id
            )));
        }
        Ok(file)
    }

    /// A `master_id` must name a live record of the same kind owned by the requester.
    pub(crate) async fn check_master(
        &self,
        master_id: Option<Uuid>,
        kind: FileKind,
        owner_id: Uuid,
    ) -> Result<(), AppError> {
        let Some(master_id) = master_id else {
            return Ok(());
        };
        let master = self.load_owned(master_id, owner_id).await?;
        if master.kind() != kind {
            return Err(AppError::InvalidInput(format!(
                "Master {} is a {} file, not {}",
                master_id,
                master.kind(),
                kind
            )));
        }
        Ok(())
    }

    /// Fresh record with zeroed technical fields.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_asset(
        &self,
        kind: FileKind,
        key: &str,
        original_filename: &str,
        content_type: &str,
        size: u64,
        owner_id: Uuid,
        is_public: bool,
        metadata: serde_json::Value,
        master_id: Option<Uuid>,
    ) -> FileAsset {
        let base = FileBase::new(NewFile {
            original_filename: original_filename.to_string(),
            mime_type: content_type.to_string(),
            size: size as i64,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            owner_id,
            is_public,
            metadata,
        });
        let technical = TechnicalMetadata::zeroed(kind, content_type, original_filename);
        FileAsset::from_parts(base, technical, master_id)
    }

    pub(crate) fn enqueue_validation(&self, id: Uuid) {
        if let Some(queue) = &self.validation {
            queue.enqueue(id);
        }
    }

    /// Remove a record that never reached COMPLETE; failures are logged.
    pub(crate) async fn discard_record(&self, id: Uuid) {
        if let Err(e) = self.files.delete(id).await {
            tracing::error!(error = %e, file_id = %id, "Failed to remove file record during rollback");
        }
    }
}

/// Resolve the kind from an explicit tag or from MIME/extension.
pub(crate) fn resolve_kind(
    requested: Option<FileKind>,
    content_type: &str,
    filename: &str,
) -> Result<FileKind, AppError> {
    requested
        .or_else(|| FileKind::detect(content_type, filename))
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Cannot determine file kind of '{}' ({})",
                filename, content_type
            ))
        })
}

/// Provider object metadata: user keys as strings plus the record id.
pub(crate) fn object_options(
    content_type: &str,
    metadata: &serde_json::Value,
    file_id: Uuid,
) -> UploadOptions {
    let mut options = UploadOptions::with_content_type(content_type);
    options.metadata = string_map(metadata);
    options
        .metadata
        .insert("cadence-file-id".to_string(), file_id.to_string());
    options
}

/// Flatten a JSON object into provider metadata; non-string values keep their JSON text.
pub(crate) fn string_map(metadata: &serde_json::Value) -> HashMap<String, String> {
    metadata
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn sha256_hex(data: &Bytes) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

/// Status a file must be in for read or write access to its bytes.
pub(crate) fn require_complete(file: &FileAsset) -> Result<(), AppError> {
    match file.base().status {
        FileStatus::Complete => Ok(()),
        other => Err(AppError::InvalidState(format!(
            "File {} is {}, not COMPLETE",
            file.id(),
            other
        ))),
    }
}
