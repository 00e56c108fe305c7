//! Shared fixtures for service tests: local storage in a temp dir, in-memory
//! repositories and a scripted media inspector.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cadence_core::models::FileKind;
use cadence_core::Config;
use cadence_db::Repositories;
use cadence_processing::{
    BlackFrameReport, DecodeReport, LoudnessReport, MediaInspector, ProbeFormat, ProbeReport,
    ProbeStream,
};
use cadence_storage::keys::MULTIPART_DIR;
use cadence_storage::LocalStorage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::storage_service::{InitiateUpload, StorageService, UploadRequest};
use crate::validation::ValidationQueue;

pub const MIB: usize = 1024 * 1024;

pub struct TestContext {
    _dir: TempDir,
    pub root: PathBuf,
    pub repos: Repositories,
    pub service: StorageService,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::build(Config::default()).await
    }

    /// Small chunks so multipart tests stay fast.
    pub async fn with_chunk_size(chunk_size: u64) -> Self {
        let mut config = Config::default();
        config.upload.chunk_size_bytes = chunk_size;
        config.upload.max_chunk_count = 100;
        Self::build(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::build(config).await
    }

    pub async fn with_queue() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let mut ctx = Self::new().await;
        let (queue, receiver) = ValidationQueue::channel();
        ctx.service = ctx.service.clone().with_validation_queue(queue);
        (ctx, receiver)
    }

    async fn build(config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let storage = LocalStorage::new(root.clone(), "http://localhost:3000/files".to_string())
            .await
            .unwrap();
        let repos = Repositories::in_memory();
        let service = StorageService::new(Arc::new(storage), &repos, &config);
        Self {
            _dir: dir,
            root,
            repos,
            service,
        }
    }

    /// No multipart session directories are left on disk.
    pub fn multipart_dir_is_empty(&self) -> bool {
        dir_is_empty(&self.root.join(MULTIPART_DIR))
    }
}

fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

pub fn audio_request(owner: Uuid, filename: &str) -> UploadRequest {
    UploadRequest {
        filename: filename.to_string(),
        content_type: "audio/wav".to_string(),
        owner_id: owner,
        kind: None,
        is_public: false,
        metadata: serde_json::json!({}),
        master_id: None,
    }
}

pub fn image_request(owner: Uuid, filename: &str) -> UploadRequest {
    UploadRequest {
        filename: filename.to_string(),
        content_type: "image/png".to_string(),
        owner_id: owner,
        kind: Some(FileKind::Image),
        is_public: false,
        metadata: serde_json::json!({}),
        master_id: None,
    }
}

pub fn initiate_request(owner: Uuid, filename: &str, total_size: u64) -> InitiateUpload {
    InitiateUpload {
        filename: filename.to_string(),
        content_type: "audio/wav".to_string(),
        total_size,
        owner_id: owner,
        kind: None,
        is_public: false,
        metadata: serde_json::json!({"title": "Untitled"}),
        master_id: None,
    }
}

/// ffprobe output of a PCM file with one audio stream.
pub fn audio_probe(sample_rate: u32, channels: i32, bit_rate: i64) -> ProbeReport {
    ProbeReport {
        format: ProbeFormat {
            format_name: Some("wav".to_string()),
            duration: Some("215.3".to_string()),
            bit_rate: Some(bit_rate.to_string()),
            size: None,
        },
        streams: vec![ProbeStream {
            index: 0,
            codec_type: Some("audio".to_string()),
            codec_name: Some("pcm_s24le".to_string()),
            sample_rate: Some(sample_rate.to_string()),
            channels: Some(channels),
            bits_per_raw_sample: Some("24".to_string()),
            ..ProbeStream::default()
        }],
    }
}

/// PNG with a diagonal gradient, so brightness and contrast sit mid-range.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(width, height, |x, y| {
        let v = (((x + y) * 255) / (width + height)) as u8;
        image::Rgb([v, v, v])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Inspector returning canned reports instead of running ffmpeg.
pub struct ScriptedInspector {
    probe: Option<ProbeReport>,
    loudness: LoudnessReport,
    decode: DecodeReport,
    black: BlackFrameReport,
}

impl ScriptedInspector {
    pub fn audio(probe: ProbeReport) -> Self {
        Self {
            probe: Some(probe),
            loudness: LoudnessReport {
                max_volume_db: -1.0,
                mean_volume_db: -14.0,
            },
            decode: DecodeReport {
                ok: true,
                errors: Vec::new(),
            },
            black: BlackFrameReport::default(),
        }
    }

    /// Every probe fails as if the file were not media at all.
    pub fn failing() -> Self {
        Self {
            probe: None,
            loudness: LoudnessReport {
                max_volume_db: 0.0,
                mean_volume_db: 0.0,
            },
            decode: DecodeReport::default(),
            black: BlackFrameReport::default(),
        }
    }
}

#[async_trait]
impl MediaInspector for ScriptedInspector {
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        assert!(path.exists(), "inspected file must be on disk");
        self.probe
            .clone()
            .ok_or_else(|| anyhow!("Invalid data found when processing input"))
    }

    async fn loudness(&self, _path: &Path) -> Result<LoudnessReport> {
        Ok(self.loudness)
    }

    async fn decode_check(&self, _path: &Path) -> Result<DecodeReport> {
        Ok(self.decode.clone())
    }

    async fn black_frames(&self, _path: &Path) -> Result<BlackFrameReport> {
        Ok(self.black.clone())
    }
}
