use bytes::Bytes;
use cadence_core::models::{FileAsset, FileKind, FileStatus};
use cadence_core::validation::validate_user_metadata;
use cadence_core::AppError;
use cadence_processing::MediaValidator;
use cadence_storage::keys::generate_object_key;
use uuid::Uuid;

use super::{object_options, resolve_kind, StorageService};

/// Single-shot upload of a whole payload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub owner_id: Uuid,
    /// Explicit kind; detected from MIME/extension when absent.
    pub kind: Option<FileKind>,
    pub is_public: bool,
    pub metadata: serde_json::Value,
    pub master_id: Option<Uuid>,
}

impl StorageService {
    /// Store `data` and return the COMPLETE record.
    ///
    /// The record is created PROCESSING before the bytes move and removed again
    /// if the provider write fails, so a failed upload leaves nothing behind.
    #[tracing::instrument(skip(self, data, request), fields(
        owner_id = %request.owner_id,
        filename = %request.filename,
        size_bytes = data.len()
    ))]
    pub async fn upload_file(
        &self,
        data: Bytes,
        request: UploadRequest,
    ) -> Result<FileAsset, AppError> {
        let kind = resolve_kind(request.kind, &request.content_type, &request.filename)?;
        MediaValidator::for_kind(kind, &self.upload).validate_all(
            &request.filename,
            &request.content_type,
            data.len() as u64,
        )?;
        validate_user_metadata(&request.metadata)?;
        self.check_master(request.master_id, kind, request.owner_id)
            .await?;

        let key = generate_object_key(kind, request.owner_id, &request.filename);
        let mut asset = self.new_asset(
            kind,
            &key,
            &request.filename,
            &request.content_type,
            data.len() as u64,
            request.owner_id,
            request.is_public,
            request.metadata,
            request.master_id,
        );
        asset.base_mut().status = FileStatus::Processing;
        let asset = self.files.create(&asset, None).await?;
        let file_id = asset.id();

        let options = object_options(&request.content_type, &asset.base().metadata, file_id);
        let start = std::time::Instant::now();
        let stored = match self.storage.upload(&key, data, &options).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = %e, key = %key, file_id = %file_id, "Provider upload failed");
                self.discard_record(file_id).await;
                return Err(e.into());
            }
        };

        let completed = match self
            .files
            .mark_complete(file_id, &stored.url, stored.size as i64)
            .await
        {
            Ok(Some(file)) => file,
            Ok(None) => {
                self.rollback_stored(file_id, &key).await;
                return Err(AppError::InvalidState(format!(
                    "File {} left PROCESSING before its upload completed",
                    file_id
                )));
            }
            Err(e) => {
                self.rollback_stored(file_id, &key).await;
                return Err(e);
            }
        };

        tracing::info!(
            file_id = %file_id,
            key = %key,
            kind = %kind,
            size_bytes = stored.size,
            duration_ms = start.elapsed().as_millis() as u64,
            "File uploaded"
        );

        self.enqueue_validation(file_id);
        Ok(completed)
    }

    async fn rollback_stored(&self, file_id: Uuid, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(error = %e, key = %key, "Failed to remove object during rollback");
        }
        self.discard_record(file_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{audio_request, image_request, TestContext};
    use cadence_core::models::{FileAsset, ValidationStatus};
    use cadence_core::ErrorMetadata;

    #[tokio::test]
    async fn test_upload_then_download_is_byte_identical() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

        let file = ctx
            .service
            .upload_file(Bytes::from(payload.clone()), audio_request(owner, "take.wav"))
            .await
            .unwrap();
        assert_eq!(file.base().status, FileStatus::Complete);
        assert_eq!(file.base().size, payload.len() as i64);
        assert!(!file.base().path.is_empty());
        assert_eq!(file.base().validation_status, ValidationStatus::Pending);

        let downloaded = ctx.service.download(file.id(), owner).await.unwrap();
        assert_eq!(downloaded.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_dotted_track_names_upload() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        for name in ["Intro...Outro.wav", "Mix..v2.wav"] {
            let file = ctx
                .service
                .upload_file(Bytes::from_static(b"RIFFdata"), audio_request(owner, name))
                .await
                .unwrap();
            assert!(!file.base().key.contains(".."));
            let copy = ctx.service.copy_file(file.id(), owner, None).await.unwrap();
            assert_eq!(copy.base().status, FileStatus::Complete);
            let moved = ctx
                .service
                .move_file(file.id(), "Outro..final.wav", owner)
                .await
                .unwrap();
            assert_eq!(moved.base().filename, "Outro.final.wav");
        }
    }

    #[tokio::test]
    async fn test_upload_zeroes_technical_fields() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"png-bytes"), image_request(owner, "cover.png"))
            .await
            .unwrap();
        match file {
            FileAsset::Image(image) => {
                assert_eq!(image.technical.width, 0);
                assert_eq!(image.technical.format.as_str(), "png");
            }
            other => panic!("expected an image record, got {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_boundary_rejections_leave_no_record() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();

        let mut wrong_type = audio_request(owner, "take.wav");
        wrong_type.content_type = "image/png".to_string();
        wrong_type.kind = Some(FileKind::Audio);
        let err = ctx
            .service
            .upload_file(Bytes::from_static(b"abc"), wrong_type)
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 400);

        let err = ctx
            .service
            .upload_file(Bytes::new(), audio_request(owner, "take.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut unknown = audio_request(owner, "notes.pdf");
        unknown.content_type = "application/pdf".to_string();
        assert!(ctx
            .service
            .upload_file(Bytes::from_static(b"%PDF"), unknown)
            .await
            .is_err());

        assert!(ctx
            .repos
            .files
            .list_awaiting_validation(100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_master_must_be_same_kind_and_owned() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let master = ctx
            .service
            .upload_file(Bytes::from_static(b"master"), audio_request(owner, "master.wav"))
            .await
            .unwrap();

        let mut preview = audio_request(owner, "preview.mp3");
        preview.content_type = "audio/mpeg".to_string();
        preview.master_id = Some(master.id());
        let version = ctx
            .service
            .upload_file(Bytes::from_static(b"preview"), preview)
            .await
            .unwrap();
        assert_eq!(version.master_id(), Some(master.id()));

        let versions = ctx.service.list_versions(master.id(), owner).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id(), version.id());

        let mut cover = image_request(owner, "cover.png");
        cover.master_id = Some(master.id());
        let err = ctx
            .service
            .upload_file(Bytes::from_static(b"img"), cover)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let mut foreign = audio_request(Uuid::new_v4(), "other.wav");
        foreign.master_id = Some(master.id());
        let err = ctx
            .service
            .upload_file(Bytes::from_static(b"x"), foreign)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_completed_upload_is_queued_for_validation() {
        let (ctx, mut queued) = TestContext::with_queue().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"bytes"), audio_request(owner, "a.wav"))
            .await
            .unwrap();
        assert_eq!(queued.recv().await, Some(file.id()));
    }
}
