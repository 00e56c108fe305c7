use crate::keys::{validate_key, METADATA_SIDECAR_SUFFIX, MULTIPART_DIR};
use crate::traits::{
    ByteReader, ByteStream, CompletedPart, ObjectMetadata, SignedUrl, SignedUrlKind,
    StorageError, StorageProvider, StorageResult, StoredObject, UploadOptions,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const SESSION_FILE: &str = "upload.json";
const ASSEMBLY_FILE: &str = "assembled";

/// Metadata kept next to each object, since the filesystem has nowhere to attach it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar {
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    updated_at: Option<DateTime<Utc>>,
}

/// State of one simulated multipart session, stored in its temp directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultipartSession {
    key: String,
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

/// Local filesystem storage implementation
///
/// Multipart sessions live under `{base}/.multipart/{upload_id}/` as `part_{n}`
/// files. Completion streams them in part order into a temp file inside the
/// session directory, then renames it over the final path, so a crash never
/// leaves a truncated object at the canonical location.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/cadence/files")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        // Symlinks inside the root could still point elsewhere.
        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn multipart_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        let id = Uuid::parse_str(upload_id).map_err(|_| {
            StorageError::InvalidKey(format!("Invalid multipart upload id: {}", upload_id))
        })?;
        Ok(self.base_path.join(MULTIPART_DIR).join(id.to_string()))
    }

    fn part_path(dir: &Path, part_number: i32) -> PathBuf {
        dir.join(format!("part_{}", part_number))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(METADATA_SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Hidden sibling used for write-then-rename.
    fn temp_sibling(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }

    /// Generate public URL for file
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn path_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_sidecar(path: &Path) -> StorageResult<Sidecar> {
        let sidecar = Self::sidecar_path(path);
        match fs::read(&sidecar).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                StorageError::BackendError(format!(
                    "Corrupt metadata sidecar {}: {}",
                    sidecar.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> StorageResult<()> {
        let raw = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        fs::write(Self::sidecar_path(path), raw).await?;
        Ok(())
    }

    async fn remove_if_exists(path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `data` to a temp sibling, sync, and rename over `path`.
    async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
        let temp = Self::temp_sibling(path);
        let result = async {
            let mut file = fs::File::create(&temp).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    temp.display(),
                    e
                ))
            })?;
            file.write_all(data).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to write file {}: {}", temp.display(), e))
            })?;
            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", temp.display(), e))
            })?;
            fs::rename(&temp, path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move {} into place: {}",
                    path.display(),
                    e
                ))
            })
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        result
    }

    async fn load_session(&self, key: &str, upload_id: &str) -> StorageResult<(PathBuf, MultipartSession)> {
        let dir = self.multipart_dir(upload_id)?;
        let raw = match fs::read(dir.join(SESSION_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!(
                    "multipart upload {}",
                    upload_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let session: MultipartSession = serde_json::from_slice(&raw)
            .map_err(|e| StorageError::MultipartFailed(format!("Corrupt session state: {}", e)))?;
        if session.key != key {
            return Err(StorageError::MultipartFailed(format!(
                "Upload {} belongs to a different key",
                upload_id
            )));
        }
        Ok((dir, session))
    }

    /// Stream the listed parts, in ascending part order, into `target`.
    async fn concatenate_parts(
        dir: &Path,
        parts: &[CompletedPart],
        target: &Path,
    ) -> StorageResult<u64> {
        let mut out = fs::File::create(target).await.map_err(|e| {
            StorageError::MultipartFailed(format!("Failed to create {}: {}", target.display(), e))
        })?;
        let mut total = 0u64;
        for part in parts {
            let part_path = Self::part_path(dir, part.part_number);
            let mut input = match fs::File::open(&part_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::MultipartFailed(format!(
                        "part {} is missing",
                        part.part_number
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            total += tokio::io::copy(&mut input, &mut out).await.map_err(|e| {
                StorageError::MultipartFailed(format!(
                    "Failed to append part {}: {}",
                    part.part_number, e
                ))
            })?;
        }
        out.sync_all().await?;
        Ok(total)
    }

    async fn collect_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                if name.ends_with(METADATA_SIDECAR_SUFFIX) {
                    continue;
                }
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.base_path) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject> {
        let path = self.key_to_path(key)?;
        let size = data.len() as u64;

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        Self::write_atomic(&path, &data).await?;
        Self::write_sidecar(
            &path,
            &Sidecar {
                content_type: options.content_type.clone(),
                metadata: options.metadata.clone(),
                updated_at: Some(Utc::now()),
            },
        )
        .await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.generate_url(key),
            size,
        })
    }

    async fn upload_stream(
        &self,
        key: &str,
        mut reader: ByteReader,
        options: &UploadOptions,
    ) -> StorageResult<StoredObject> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let temp = Self::temp_sibling(&path);
        let result = async {
            let mut file = fs::File::create(&temp).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    temp.display(),
                    e
                ))
            })?;
            let copied = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write stream to file {}: {}",
                    temp.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", temp.display(), e))
            })?;
            fs::rename(&temp, &path).await?;
            Ok::<u64, StorageError>(copied)
        }
        .await;

        let bytes_copied = match result {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                tracing::error!(key = %key, error = %e, "Local storage stream upload failed");
                return Err(e);
            }
        };

        Self::write_sidecar(
            &path,
            &Sidecar {
                content_type: options.content_type.clone(),
                metadata: options.metadata.clone(),
                updated_at: Some(Utc::now()),
            },
        )
        .await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage stream upload successful"
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.generate_url(key),
            size: bytes_copied,
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !Self::path_exists(&path).await {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !Self::path_exists(&path).await {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let key = key.to_string();
        let path_display = path.display().to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    path = %path_display,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream download error"
                );
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn get_signed_url(&self, key: &str, _ttl: Duration) -> StorageResult<SignedUrl> {
        let path = self.key_to_path(key)?;
        if !Self::path_exists(&path).await {
            return Err(StorageError::NotFound(key.to_string()));
        }

        tracing::debug!(
            key = %key,
            "Local storage cannot sign URLs; returning unsigned reference"
        );

        Ok(SignedUrl {
            url: self.generate_url(key),
            expires_at: None,
            kind: SignedUrlKind::LocalReference,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        Self::remove_if_exists(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;
        Self::remove_if_exists(&Self::sidecar_path(&path)).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(Self::path_exists(&path).await)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if prefix.starts_with('/') || prefix.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidKey(
                "Prefix contains invalid characters".to_string(),
            ));
        }
        self.collect_keys(prefix).await
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let path = self.key_to_path(key)?;
        let stat = match fs::metadata(&path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };
        let sidecar = Self::read_sidecar(&path).await?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: stat.len(),
            content_type: sidecar.content_type,
            etag: None,
            last_modified: stat.modified().ok().map(DateTime::<Utc>::from),
            custom: sidecar.metadata,
        })
    }

    async fn update_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<ObjectMetadata> {
        let path = self.key_to_path(key)?;
        if !Self::path_exists(&path).await {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let mut sidecar = Self::read_sidecar(&path).await?;
        sidecar.metadata = metadata;
        sidecar.updated_at = Some(Utc::now());
        Self::write_sidecar(&path, &sidecar).await?;

        tracing::info!(key = %key, keys = sidecar.metadata.len(), "Local storage metadata updated");

        self.get_metadata(key).await
    }

    async fn move_object(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject> {
        let from_path = self.key_to_path(from_key)?;
        let to_path = self.key_to_path(to_key)?;

        if !Self::path_exists(&from_path).await {
            return Err(StorageError::NotFound(from_key.to_string()));
        }

        self.ensure_parent_dir(&to_path).await?;

        fs::rename(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to move {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        let from_sidecar = Self::sidecar_path(&from_path);
        let to_sidecar = Self::sidecar_path(&to_path);
        if Self::path_exists(&from_sidecar).await {
            fs::rename(&from_sidecar, &to_sidecar).await?;
        } else {
            Self::remove_if_exists(&to_sidecar).await?;
        }

        let size = fs::metadata(&to_path).await?.len();

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            "Local storage move successful"
        );

        Ok(StoredObject {
            key: to_key.to_string(),
            url: self.generate_url(to_key),
            size,
        })
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<StoredObject> {
        let from_path = self.key_to_path(from_key)?;
        let to_path = self.key_to_path(to_key)?;

        if !Self::path_exists(&from_path).await {
            return Err(StorageError::NotFound(from_key.to_string()));
        }

        self.ensure_parent_dir(&to_path).await?;

        let size = fs::copy(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        let from_sidecar = Self::sidecar_path(&from_path);
        let to_sidecar = Self::sidecar_path(&to_path);
        if Self::path_exists(&from_sidecar).await {
            fs::copy(&from_sidecar, &to_sidecar).await?;
        } else {
            Self::remove_if_exists(&to_sidecar).await?;
        }

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            "Local storage copy successful"
        );

        Ok(StoredObject {
            key: to_key.to_string(),
            url: self.generate_url(to_key),
            size,
        })
    }

    async fn initiate_multipart_upload(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.multipart_dir(&upload_id)?;
        fs::create_dir_all(&dir).await?;

        let session = MultipartSession {
            key: key.to_string(),
            content_type: options.content_type.clone(),
            metadata: options.metadata.clone(),
            created_at: Utc::now(),
        };
        let raw = serde_json::to_vec(&session)
            .map_err(|e| StorageError::MultipartFailed(e.to_string()))?;
        fs::write(dir.join(SESSION_FILE), raw).await?;

        tracing::info!(key = %key, upload_id = %upload_id, "Local multipart upload initiated");

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        if part_number < 1 {
            return Err(StorageError::MultipartFailed(format!(
                "Invalid part number {}",
                part_number
            )));
        }
        let (dir, _) = self.load_session(key, upload_id).await?;
        let start = std::time::Instant::now();

        let etag = hex::encode(Sha256::digest(&data));
        Self::write_atomic(&Self::part_path(&dir, part_number), &data).await?;

        tracing::debug!(
            key = %key,
            upload_id = %upload_id,
            part_number,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart part stored"
        );

        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<StoredObject> {
        let (dir, session) = self.load_session(key, upload_id).await?;
        if parts.is_empty() {
            return Err(StorageError::MultipartFailed(
                "No parts to assemble".to_string(),
            ));
        }

        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.part_number);
        if ordered.windows(2).any(|w| w[0].part_number == w[1].part_number) {
            return Err(StorageError::MultipartFailed(
                "Duplicate part numbers".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        let final_path = self.key_to_path(key)?;
        let assembled = dir.join(ASSEMBLY_FILE);

        let size = Self::concatenate_parts(&dir, &ordered, &assembled).await?;

        self.ensure_parent_dir(&final_path).await?;
        fs::rename(&assembled, &final_path).await.map_err(|e| {
            StorageError::MultipartFailed(format!(
                "Failed to move assembled object into place: {}",
                e
            ))
        })?;
        Self::write_sidecar(
            &final_path,
            &Sidecar {
                content_type: session.content_type,
                metadata: session.metadata,
                updated_at: Some(Utc::now()),
            },
        )
        .await?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to remove multipart temp directory"
            );
        }

        tracing::info!(
            key = %key,
            upload_id = %upload_id,
            parts = ordered.len(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart upload completed"
        );

        Ok(StoredObject {
            key: key.to_string(),
            url: self.generate_url(key),
            size,
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let dir = match self.load_session(key, upload_id).await {
            Ok((dir, _)) => dir,
            Err(StorageError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        fs::remove_dir_all(&dir).await.map_err(|e| {
            StorageError::MultipartFailed(format!(
                "Failed to remove multipart directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        tracing::info!(key = %key, upload_id = %upload_id, "Local multipart upload aborted");

        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        self.generate_url(key)
    }

    fn base_path(&self) -> String {
        self.base_path.display().to_string()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
