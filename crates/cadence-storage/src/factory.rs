#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{StorageBackend, StorageError, StorageProvider, StorageResult};
use cadence_core::StorageConfig;
use std::sync::Arc;

/// Create the storage provider selected by configuration.
///
/// Called once at startup; the returned handle is shared by every service.
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_REGION not configured".to_string()))?;

            let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            if config.local_storage_path.is_empty() {
                return Err(StorageError::ConfigError(
                    "LOCAL_STORAGE_PATH not configured".to_string(),
                ));
            }
            let storage = LocalStorage::new(
                &config.local_storage_path,
                config.local_storage_base_url.clone(),
            )
            .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use cadence_core::Config;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_creates_local_backend() {
        let dir = tempdir().unwrap();
        let mut config = Config::default().storage;
        config.backend = StorageBackend::Local;
        config.local_storage_path = dir.path().display().to_string();

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert_eq!(storage.base_path(), dir.path().display().to_string());
    }

    #[tokio::test]
    async fn test_s3_requires_bucket() {
        let mut config = Config::default().storage;
        config.backend = StorageBackend::S3;
        config.s3_bucket = None;

        let result = create_storage(&config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
