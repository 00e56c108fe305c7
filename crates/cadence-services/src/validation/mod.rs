//! Asynchronous content validation.
//!
//! Completed uploads are pushed onto a [`ValidationQueue`]; a background worker
//! downloads each file to a temporary path, runs the per-kind sub-checks and
//! records the outcome on the record (`PENDING -> IN_PROGRESS -> PASSED|FAILED`).
//! A validation failure never affects the stored bytes.

mod audio;
mod image;
mod video;

use cadence_core::models::{FileAsset, FileStatus, TechnicalMetadata, ValidationStatus};
use cadence_core::{AppError, ValidationThresholds};
use cadence_db::FileRepository;
use cadence_processing::MediaInspector;
use cadence_storage::StorageProvider;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch, Semaphore};
use utoipa::ToSchema;
use uuid::Uuid;

/// Files still awaiting validation that are re-queued at startup.
const RECOVERY_BATCH: i64 = 1000;

/// Default age after which an IN_PROGRESS run is treated as abandoned.
const STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(3600);

/// Sender half of the validation work queue.
#[derive(Clone, Debug)]
pub struct ValidationQueue {
    sender: mpsc::UnboundedSender<Uuid>,
}

impl ValidationQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, file_id: Uuid) {
        if self.sender.send(file_id).is_err() {
            tracing::warn!(file_id = %file_id, "Validation worker is gone; file stays PENDING until restart");
        }
    }
}

/// Outcome of one sub-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub value: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn pass(detail: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
            value: serde_json::to_value(value).ok(),
        }
    }

    pub fn fail(detail: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            value: serde_json::to_value(value).ok(),
        }
    }

    pub fn check(passed: bool, detail: impl Into<String>, value: impl Serialize) -> Self {
        if passed {
            Self::pass(detail, value)
        } else {
            Self::fail(detail, value)
        }
    }

    /// A check that could not run.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            value: None,
        }
    }
}

/// Every sub-check of one run plus the technical fields it discovered.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub checks: BTreeMap<String, CheckResult>,
    pub technical: Option<TechnicalMetadata>,
}

impl ValidationOutcome {
    pub fn record(&mut self, name: &str, result: CheckResult) {
        self.checks.insert(name.to_string(), result);
    }

    /// True only when there is at least one check and all of them passed.
    pub fn passed(&self) -> bool {
        !self.checks.is_empty() && self.checks.values().all(|c| c.passed)
    }

    pub fn status(&self) -> ValidationStatus {
        if self.passed() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        }
    }

    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn to_json(&self, validated_at: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "passed": self.passed(),
            "checks": self.checks,
            "validatedAt": validated_at,
        })
    }
}

/// Polling view of a file's validation state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationReport {
    pub file_id: Uuid,
    pub status: ValidationStatus,
    pub checks: BTreeMap<String, CheckResult>,
    pub validated_at: Option<DateTime<Utc>>,
    /// Last infrastructure error when a run could not complete.
    pub error: Option<String>,
}

impl ValidationReport {
    pub fn from_asset(file: &FileAsset) -> Self {
        let results = &file.base().validation_results;
        Self {
            file_id: file.id(),
            status: file.base().validation_status,
            checks: results
                .get("checks")
                .cloned()
                .and_then(|c| serde_json::from_value(c).ok())
                .unwrap_or_default(),
            validated_at: results
                .get("validatedAt")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok()),
            error: results
                .get("error")
                .and_then(|e| e.as_str())
                .map(str::to_string),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    /// `Integrity` naming the failed checks when validation FAILED,
    /// `InvalidState` while it has not finished.
    pub fn ensure_passed(&self) -> Result<(), AppError> {
        match self.status {
            ValidationStatus::Passed => Ok(()),
            ValidationStatus::Failed => {
                let failed: Vec<&str> = self
                    .checks
                    .iter()
                    .filter(|(_, check)| !check.passed)
                    .map(|(name, _)| name.as_str())
                    .collect();
                Err(AppError::Integrity(format!(
                    "File {} failed validation: {}",
                    self.file_id,
                    failed.join(", ")
                )))
            }
            other => Err(AppError::InvalidState(format!(
                "File {} validation is {}",
                self.file_id, other
            ))),
        }
    }
}

pub struct FileValidationService {
    files: Arc<dyn FileRepository>,
    storage: Arc<dyn StorageProvider>,
    inspector: Arc<dyn MediaInspector>,
    thresholds: ValidationThresholds,
    permits: Arc<Semaphore>,
    stale_after: std::time::Duration,
    queue: ValidationQueue,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Uuid>>>,
}

impl FileValidationService {
    pub fn new(
        files: Arc<dyn FileRepository>,
        storage: Arc<dyn StorageProvider>,
        inspector: Arc<dyn MediaInspector>,
        thresholds: ValidationThresholds,
        max_concurrency: usize,
    ) -> Self {
        let (queue, receiver) = ValidationQueue::channel();
        Self {
            files,
            storage,
            inspector,
            thresholds,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            stale_after: STALE_AFTER,
            queue,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Age after which a run left IN_PROGRESS by a dead worker is retried.
    pub fn with_stale_after(mut self, stale_after: std::time::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Queue handle for producers (the storage service).
    pub fn queue(&self) -> ValidationQueue {
        self.queue.clone()
    }

    pub fn enqueue(&self, file_id: Uuid) {
        self.queue.enqueue(file_id);
    }

    /// Start the background worker.
    ///
    /// Runs abandoned IN_PROGRESS for longer than `stale_after` go back to
    /// PENDING, then every PENDING file is queued. The worker stops when
    /// `shutdown` flips to true; validations already running finish on their
    /// own tasks.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let receiver = self.receiver.lock().ok().and_then(|mut slot| slot.take());
        tokio::spawn(async move {
            let Some(mut receiver) = receiver else {
                tracing::warn!("Validation worker already started");
                return;
            };

            self.recover_stale_runs().await;
            match self.files.list_awaiting_validation(RECOVERY_BATCH).await {
                Ok(ids) => {
                    if !ids.is_empty() {
                        tracing::info!(count = ids.len(), "Re-queueing files awaiting validation");
                    }
                    for id in ids {
                        self.queue.enqueue(id);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to load files awaiting validation"),
            }

            tracing::info!("Validation worker started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let next = tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    next = receiver.recv() => next,
                };
                let Some(file_id) = next else {
                    break;
                };

                let permit = match self.permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let service = self.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = service.validate_file(file_id).await {
                        tracing::error!(error = %e, file_id = %file_id, "Validation run failed");
                    }
                });
            }
            tracing::info!("Validation worker stopped");
        })
    }

    async fn recover_stale_runs(&self) {
        let stale_before = match chrono::Duration::from_std(self.stale_after) {
            Ok(age) => Utc::now() - age,
            Err(e) => {
                tracing::error!(error = %e, "Invalid stale validation age");
                return;
            }
        };
        match self.files.reset_stale_validations(stale_before).await {
            Ok(ids) if !ids.is_empty() => {
                tracing::warn!(count = ids.len(), "Abandoned validation runs returned to PENDING")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to recover abandoned validation runs"),
        }
    }

    /// Validate one file now and return its report.
    ///
    /// Only a PENDING file is claimed; a finished or IN_PROGRESS file returns
    /// its current report without running anything. Infrastructure failures
    /// put the file back to PENDING so a later run retries it.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn validate_file(&self, file_id: Uuid) -> Result<ValidationReport, AppError> {
        let file = self
            .files
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;
        if file.base().status != FileStatus::Complete {
            return Err(AppError::InvalidState(format!(
                "File {} is {}; only COMPLETE files are validated",
                file_id,
                file.base().status
            )));
        }

        if file.base().validation_status != ValidationStatus::Pending {
            return Ok(ValidationReport::from_asset(&file));
        }
        let Some(claimed) = self.files.claim_validation(file_id).await? else {
            tracing::debug!("Validation claimed elsewhere");
            return Ok(ValidationReport::from_asset(&self.reload(file_id).await?));
        };

        let start = std::time::Instant::now();
        let outcome = match self.inspect(&claimed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Validation could not run; returning file to PENDING");
                let results = serde_json::json!({
                    "error": e.to_string(),
                    "failedAt": Utc::now(),
                });
                if self
                    .files
                    .finish_validation(file_id, ValidationStatus::Pending, &results, None)
                    .await?
                    .is_none()
                {
                    tracing::warn!("Validation run was taken over before it could be released");
                }
                return Err(e);
            }
        };

        let status = outcome.status();
        let Some(updated) = self
            .files
            .finish_validation(
                file_id,
                status,
                &outcome.to_json(Utc::now()),
                outcome.technical.as_ref(),
            )
            .await?
        else {
            tracing::warn!(status = %status, "Validation run was taken over; discarding its result");
            return Ok(ValidationReport::from_asset(&self.reload(file_id).await?));
        };

        tracing::info!(
            kind = %claimed.kind(),
            status = %status,
            failed_checks = ?outcome.failed_checks(),
            duration_ms = start.elapsed().as_millis() as u64,
            "File validated"
        );
        Ok(ValidationReport::from_asset(&updated))
    }

    /// Current report of a file the requester may read.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn get_validation_report(
        &self,
        file_id: Uuid,
        requester: Uuid,
    ) -> Result<ValidationReport, AppError> {
        let file = self.reload(file_id).await?;
        if !file.base().is_accessible_by(requester) {
            return Err(AppError::AccessDenied(format!(
                "File {} is private to its owner",
                file_id
            )));
        }
        Ok(ValidationReport::from_asset(&file))
    }

    /// Report of a file that is fit for distribution.
    ///
    /// Callers that hand an asset downstream use this instead of reading the
    /// status themselves.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn require_passed(
        &self,
        file_id: Uuid,
        requester: Uuid,
    ) -> Result<ValidationReport, AppError> {
        let report = self.get_validation_report(file_id, requester).await?;
        report.ensure_passed()?;
        Ok(report)
    }

    async fn reload(&self, file_id: Uuid) -> Result<FileAsset, AppError> {
        match self.files.find_by_id(file_id).await? {
            Some(file) if !file.base().is_deleted() => Ok(file),
            _ => Err(AppError::NotFound(format!("File {} not found", file_id))),
        }
    }

    /// Download to a temporary file and run the checks for the file's kind.
    ///
    /// Errors here are infrastructure errors; failed inspections become failed
    /// sub-checks inside the outcome.
    async fn inspect(&self, file: &FileAsset) -> Result<ValidationOutcome, AppError> {
        let base = file.base();
        let suffix = cadence_core::models::file_extension(&base.original_filename)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix("cadence-validate-")
            .suffix(&suffix)
            .tempfile()?;
        self.download_to(&base.key, temp.path()).await?;

        let outcome = match file {
            FileAsset::Audio(audio) => {
                audio::validate(
                    self.inspector.as_ref(),
                    temp.path(),
                    audio.technical.format,
                    &self.thresholds.audio,
                )
                .await
            }
            FileAsset::Image(image) => {
                let data = tokio::fs::read(temp.path()).await?;
                image::validate(data, image.technical.format, &self.thresholds.image).await
            }
            FileAsset::Video(video) => {
                video::validate(
                    self.inspector.as_ref(),
                    temp.path(),
                    video.technical.format,
                    &self.thresholds.video,
                )
                .await
            }
        };
        Ok(outcome)
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<(), AppError> {
        let mut stream = self.storage.download_stream(key).await?;
        let mut out = tokio::fs::File::create(path).await?;
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        audio_probe, audio_request, image_request, png_bytes, ScriptedInspector, TestContext,
    };
    use bytes::Bytes;
    use cadence_core::models::TechnicalMetadata;

    fn service(ctx: &TestContext, inspector: ScriptedInspector) -> Arc<FileValidationService> {
        Arc::new(FileValidationService::new(
            ctx.repos.files.clone(),
            ctx.service.provider().clone(),
            Arc::new(inspector),
            ValidationThresholds::default(),
            2,
        ))
    }

    #[tokio::test]
    async fn test_low_sample_rate_fails_format_check() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFFdata"), audio_request(owner, "demo.wav"))
            .await
            .unwrap();

        let validator = service(&ctx, ScriptedInspector::audio(audio_probe(22_050, 2, 705_600)));
        let err = validator.require_passed(file.id(), owner).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let report = validator.validate_file(file.id()).await.unwrap();

        assert_eq!(report.status, ValidationStatus::Failed);
        assert!(!report.checks["format"].passed);
        assert!(report.checks["channels"].passed);

        match validator.require_passed(file.id(), owner).await.unwrap_err() {
            AppError::Integrity(message) => assert!(message.contains("format")),
            other => panic!("expected an integrity error, got {:?}", other),
        }

        let record = ctx.repos.files.find_by_id(file.id()).await.unwrap().unwrap();
        assert_eq!(record.base().validation_status, ValidationStatus::Failed);
        assert_eq!(record.base().status, FileStatus::Complete);
        match record.technical() {
            TechnicalMetadata::Audio(t) => assert_eq!(t.sample_rate, 22_050),
            other => panic!("unexpected technical metadata {:?}", other),
        }
        assert!(ctx.service.download(file.id(), owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_audio_meeting_thresholds_passes() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFFdata"), audio_request(owner, "master.wav"))
            .await
            .unwrap();

        let validator = service(
            &ctx,
            ScriptedInspector::audio(audio_probe(48_000, 2, 2_304_000)),
        );
        let report = validator.validate_file(file.id()).await.unwrap();

        assert_eq!(report.status, ValidationStatus::Passed, "{:?}", report.checks);
        for name in ["audio_stream", "format", "channels", "bitrate", "loudness", "integrity"] {
            assert!(report.checks[name].passed, "{} should pass", name);
        }

        let record = ctx.repos.files.find_by_id(file.id()).await.unwrap().unwrap();
        match record.technical() {
            TechnicalMetadata::Audio(t) => {
                assert_eq!(t.sample_rate, 48_000);
                assert_eq!(t.channels, 2);
                assert_eq!(t.codec.as_deref(), Some("pcm_s24le"));
                assert_eq!(t.peak_db, Some(-1.0));
            }
            other => panic!("unexpected technical metadata {:?}", other),
        }

        assert!(validator.require_passed(file.id(), owner).await.is_ok());

        // Finished validations are not re-run.
        let again = validator.validate_file(file.id()).await.unwrap();
        assert_eq!(again.validated_at, report.validated_at);
    }

    #[tokio::test]
    async fn test_inspector_failure_is_a_failed_check() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"junk"), audio_request(owner, "junk.wav"))
            .await
            .unwrap();

        let validator = service(&ctx, ScriptedInspector::failing());
        let report = validator.validate_file(file.id()).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Failed);
        assert!(!report.checks["audio_stream"].passed);
    }

    #[tokio::test]
    async fn test_missing_object_returns_file_to_pending() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFF"), audio_request(owner, "lost.wav"))
            .await
            .unwrap();
        ctx.service.provider().delete(&file.base().key).await.unwrap();

        let validator = service(&ctx, ScriptedInspector::audio(audio_probe(48_000, 2, 2_304_000)));
        assert!(validator.validate_file(file.id()).await.is_err());

        let report = validator.get_validation_report(file.id(), owner).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Pending);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_artwork_checks() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let validator = service(&ctx, ScriptedInspector::failing());

        let cover = ctx
            .service
            .upload_file(Bytes::from(png_bytes(1500, 1500)), image_request(owner, "cover.png"))
            .await
            .unwrap();
        let report = validator.validate_file(cover.id()).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Passed, "{:?}", report.checks);

        let banner = ctx
            .service
            .upload_file(Bytes::from(png_bytes(1600, 400)), image_request(owner, "banner.png"))
            .await
            .unwrap();
        let report = validator.validate_file(banner.id()).await.unwrap();
        assert_eq!(report.status, ValidationStatus::Failed);
        assert!(!report.checks["aspect_ratio"].passed);
        assert!(!report.checks["dimensions"].passed);
        assert!(report.checks["decode"].passed);

        let record = ctx.repos.files.find_by_id(banner.id()).await.unwrap().unwrap();
        match record.technical() {
            TechnicalMetadata::Image(t) => assert_eq!((t.width, t.height), (1600, 400)),
            other => panic!("unexpected technical metadata {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_validates_queued_uploads() {
        let ctx = TestContext::new().await;
        let validator = service(
            &ctx,
            ScriptedInspector::audio(audio_probe(44_100, 2, 1_411_200)),
        );
        let storage = ctx.service.clone().with_validation_queue(validator.queue());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = validator.clone().start(shutdown_rx);

        let owner = Uuid::new_v4();
        let file = storage
            .upload_file(Bytes::from_static(b"RIFF"), audio_request(owner, "queued.wav"))
            .await
            .unwrap();

        let mut status = ValidationStatus::Pending;
        for _ in 0..100 {
            status = validator
                .get_validation_report(file.id(), owner)
                .await
                .unwrap()
                .status;
            if status.is_finished() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(status, ValidationStatus::Passed);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_in_progress_elsewhere_is_left_alone() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFFdata"), audio_request(owner, "busy.wav"))
            .await
            .unwrap();
        ctx.repos.files.claim_validation(file.id()).await.unwrap().unwrap();

        let validator = service(&ctx, ScriptedInspector::audio(audio_probe(48_000, 2, 2_304_000)));
        let report = validator.validate_file(file.id()).await.unwrap();
        assert_eq!(report.status, ValidationStatus::InProgress);
        assert!(report.checks.is_empty());

        let record = ctx.repos.files.find_by_id(file.id()).await.unwrap().unwrap();
        assert_eq!(record.base().validation_status, ValidationStatus::InProgress);
        assert_eq!(record.base().validation_results, file.base().validation_results);
    }

    #[tokio::test]
    async fn test_worker_retries_abandoned_runs_at_startup() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFFdata"), audio_request(owner, "orphan.wav"))
            .await
            .unwrap();
        ctx.repos.files.claim_validation(file.id()).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let validator = Arc::new(
            FileValidationService::new(
                ctx.repos.files.clone(),
                ctx.service.provider().clone(),
                Arc::new(ScriptedInspector::audio(audio_probe(48_000, 2, 2_304_000))),
                ValidationThresholds::default(),
                2,
            )
            .with_stale_after(std::time::Duration::ZERO),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = validator.clone().start(shutdown_rx);

        let mut status = ValidationStatus::InProgress;
        for _ in 0..100 {
            status = validator
                .get_validation_report(file.id(), owner)
                .await
                .unwrap()
                .status;
            if status.is_finished() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(status, ValidationStatus::Passed);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_report_respects_visibility() {
        let ctx = TestContext::new().await;
        let owner = Uuid::new_v4();
        let file = ctx
            .service
            .upload_file(Bytes::from_static(b"RIFF"), audio_request(owner, "private.wav"))
            .await
            .unwrap();
        let validator = service(&ctx, ScriptedInspector::failing());
        let err = validator
            .get_validation_report(file.id(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }
}
