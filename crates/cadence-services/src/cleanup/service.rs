use cadence_core::AppError;
use cadence_db::{ChunkRepository, Repositories};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

use crate::storage_service::StorageService;

/// Sessions reclaimed per sweep.
const SWEEP_BATCH: i64 = 100;

/// Periodic reclamation of multipart sessions whose chunks expired.
#[derive(Clone)]
pub struct CleanupService {
    service: StorageService,
    chunks: Arc<dyn ChunkRepository>,
    interval: Duration,
}

impl CleanupService {
    pub fn new(service: StorageService, repositories: &Repositories, interval: Duration) -> Self {
        Self {
            service,
            chunks: repositories.chunks.clone(),
            interval,
        }
    }

    /// Start the background sweep. Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut cleanup_interval = interval(self.interval);

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                tracing::debug!("Starting sweep of expired upload sessions");

                match self.sweep_expired_sessions().await {
                    Ok(0) => {}
                    Ok(reclaimed) => tracing::info!(reclaimed, "Expired upload sessions reclaimed"),
                    Err(e) => tracing::error!(error = %e, "Upload session sweep failed"),
                }
            }
            tracing::info!("Cleanup task stopped");
        })
    }

    /// Reclaim every session past its expiry; returns how many were released.
    ///
    /// One failing session does not stop the sweep.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "expired_sessions"))]
    pub async fn sweep_expired_sessions(&self) -> Result<usize, AppError> {
        let sessions = self
            .chunks
            .find_expired_sessions(Utc::now(), SWEEP_BATCH)
            .await?;

        let mut reclaimed = 0;
        for session in &sessions {
            match self.service.reclaim_expired_session(session).await {
                Ok(true) => {
                    tracing::info!(
                        upload_id = %session.upload_id,
                        file_id = %session.file_id,
                        "Reclaimed expired upload session"
                    );
                    reclaimed += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::error!(
                    error = %e,
                    upload_id = %session.upload_id,
                    "Failed to reclaim expired upload session"
                ),
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{initiate_request, TestContext};
    use bytes::Bytes;
    use cadence_core::models::{ChunkMetadata, FileStatus};
    use cadence_core::Config;
    use uuid::Uuid;

    fn small_chunks(expiry_hours: i64) -> Config {
        let mut config = Config::default();
        config.upload.chunk_size_bytes = 1024;
        config.upload.max_chunk_count = 100;
        config.upload.chunk_expiry_hours = expiry_hours;
        config
    }

    async fn expiring_context() -> TestContext {
        TestContext::with_config(small_chunks(0)).await
    }

    #[tokio::test]
    async fn test_expired_session_is_reclaimed_without_leaks() {
        let ctx = expiring_context().await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "stale.wav", 3000))
            .await
            .unwrap();

        // Chunks past their expiry are refused.
        let err = ctx
            .service
            .upload_chunk(&session.upload_id, 1, Bytes::from(vec![0u8; 1024]), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(!ctx.multipart_dir_is_empty());

        let cleanup = CleanupService::new(ctx.service.clone(), &ctx.repos, Duration::from_secs(60));
        assert_eq!(cleanup.sweep_expired_sessions().await.unwrap(), 1);

        assert!(ctx.repos.files.find_by_id(session.file_id).await.unwrap().is_none());
        assert!(ctx
            .repos
            .chunks
            .find_by_upload(&session.upload_id)
            .await
            .unwrap()
            .is_empty());
        assert!(ctx.multipart_dir_is_empty());

        assert_eq!(cleanup.sweep_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_sessions_being_finalized() {
        let ctx = expiring_context().await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "busy.wav", 2048))
            .await
            .unwrap();
        ctx.repos
            .files
            .transition_status(session.file_id, FileStatus::Pending, FileStatus::Processing)
            .await
            .unwrap()
            .unwrap();

        let cleanup = CleanupService::new(ctx.service.clone(), &ctx.repos, Duration::from_secs(60));
        assert_eq!(cleanup.sweep_expired_sessions().await.unwrap(), 0);

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Processing);
        assert_eq!(
            ctx.repos.chunks.find_by_upload(&session.upload_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_sweep_reclaims_session_whose_finalizer_died() {
        let mut config = small_chunks(0);
        config.upload.finalize_grace_secs = 0;
        let ctx = TestContext::with_config(config).await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "crashed.wav", 2048))
            .await
            .unwrap();
        ctx.repos
            .files
            .transition_status(session.file_id, FileStatus::Pending, FileStatus::Processing)
            .await
            .unwrap()
            .unwrap();

        let cleanup = CleanupService::new(ctx.service.clone(), &ctx.repos, Duration::from_secs(60));
        assert_eq!(cleanup.sweep_expired_sessions().await.unwrap(), 1);

        assert!(ctx.repos.files.find_by_id(session.file_id).await.unwrap().is_none());
        assert!(ctx
            .repos
            .chunks
            .find_by_upload(&session.upload_id)
            .await
            .unwrap()
            .is_empty());
        assert!(ctx.multipart_dir_is_empty());
        assert_eq!(cleanup.sweep_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_finalize_is_reclaimed_after_expiry() {
        let ctx = TestContext::with_config(small_chunks(1)).await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "broken.wav", 2048))
            .await
            .unwrap();
        ctx.service
            .upload_chunk(&session.upload_id, 1, Bytes::from(vec![1u8; 1024]), owner)
            .await
            .unwrap();
        // Recorded as uploaded, but the provider never received it.
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
        assert!(ctx.service.finalize(&session.upload_id).await.is_err());

        let file = ctx.repos.files.find_by_id(session.file_id).await.unwrap().unwrap();
        assert_eq!(file.base().status, FileStatus::Failed);
        assert_eq!(
            ctx.repos.chunks.find_by_upload(&session.upload_id).await.unwrap().len(),
            2
        );

        let later = Utc::now() + chrono::Duration::hours(2);
        let expired = ctx.repos.chunks.find_expired_sessions(later, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].file_id, session.file_id);

        assert!(ctx.service.reclaim_expired_session(&expired[0]).await.unwrap());
        assert!(ctx.repos.files.find_by_id(session.file_id).await.unwrap().is_none());
        assert!(ctx
            .repos
            .chunks
            .find_by_upload(&session.upload_id)
            .await
            .unwrap()
            .is_empty());
        assert!(ctx.multipart_dir_is_empty());
    }

    #[tokio::test]
    async fn test_background_task_stops_on_shutdown() {
        let ctx = expiring_context().await;
        let owner = Uuid::new_v4();
        let session = ctx
            .service
            .initiate_multipart_upload(initiate_request(owner, "late.wav", 1024))
            .await
            .unwrap();

        let cleanup = Arc::new(CleanupService::new(
            ctx.service.clone(),
            &ctx.repos,
            Duration::from_millis(10),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = cleanup.start(shutdown_rx);

        let mut gone = false;
        for _ in 0..100 {
            if ctx.repos.files.find_by_id(session.file_id).await.unwrap().is_none() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gone);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
