//! Test helpers: the real router over local storage in a temp dir, in-memory
//! repositories and a scripted media inspector.
//!
//! Run with `cargo test -p cadence-api`. No database, Docker or ffmpeg needed.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use cadence_api::setup::{self, routes};
use cadence_api::AppState;
use cadence_core::Config;
use cadence_db::Repositories;
use cadence_processing::{
    BlackFrameReport, DecodeReport, LoudnessReport, MediaInspector, ProbeReport,
};
use cadence_storage::LocalStorage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

pub const OWNER_HEADER: &str = "X-Owner-Id";

/// ffprobe output of a 24-bit stereo 48 kHz WAV master.
const WAV_MASTER_PROBE: &str = r#"{
    "streams": [
        {"index": 0, "codec_type": "audio", "codec_name": "pcm_s24le", "sample_rate": "48000",
         "channels": 2, "bits_per_raw_sample": "24"}
    ],
    "format": {"format_name": "wav", "duration": "215.3", "bit_rate": "2304000"}
}"#;

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    shutdown: watch::Sender<bool>,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Run the validation worker and the session sweep until the app is dropped.
    pub fn start_workers(&self) {
        setup::start_workers(&self.state, self.shutdown.subscribe());
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

pub async fn setup_test_app() -> TestApp {
    let mut config = Config::default();
    config.upload.chunk_size_bytes = 1024;
    config.upload.max_chunk_count = 100;
    config.cleanup_interval_secs = 0;
    setup_test_app_with(config).await
}

pub async fn setup_test_app_with(config: Config) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let storage = LocalStorage::new(
        temp_dir.path().to_path_buf(),
        "http://localhost:3000/files".to_string(),
    )
    .await
    .expect("Failed to create local storage");

    let repositories = Repositories::in_memory();
    let state = setup::build_state(
        config,
        Arc::new(storage),
        &repositories,
        Arc::new(ScriptedInspector),
    );
    let app = routes::setup_routes(&state.config, state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");
    let (shutdown, _) = watch::channel(false);

    TestApp {
        server,
        state,
        shutdown,
        _temp_dir: temp_dir,
    }
}

/// A few bytes that pass the boundary checks for `audio/wav`.
pub fn wav_bytes() -> Vec<u8> {
    let mut data = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    data.extend((0..4096u32).map(|i| (i % 251) as u8));
    data
}

pub fn wav_form(filename: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(wav_bytes())
            .file_name(filename)
            .mime_type("audio/wav"),
    )
}

/// Single-shot upload of a private WAV; returns the response body.
pub async fn upload_wav(client: &TestServer, owner: Uuid, filename: &str) -> serde_json::Value {
    upload_form(client, owner, wav_form(filename)).await
}

pub async fn upload_form(
    client: &TestServer,
    owner: Uuid,
    form: MultipartForm,
) -> serde_json::Value {
    let response = client
        .post("/api/v1/files")
        .add_header(OWNER_HEADER, owner.to_string())
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    response.json()
}

pub fn id_of(body: &serde_json::Value) -> Uuid {
    Uuid::parse_str(body["id"].as_str().expect("Expected 'id' in response"))
        .expect("Invalid UUID in response")
}

pub fn error_code(response: &TestResponse) -> String {
    let body: serde_json::Value = response.json();
    body["code"].as_str().unwrap_or_default().to_string()
}

/// Wait for a condition with timeout.
pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Reports a conforming WAV master for every file.
pub struct ScriptedInspector;

#[async_trait]
impl MediaInspector for ScriptedInspector {
    async fn probe(&self, _path: &Path) -> Result<ProbeReport> {
        Ok(ProbeReport::from_json(WAV_MASTER_PROBE.as_bytes())?)
    }

    async fn loudness(&self, _path: &Path) -> Result<LoudnessReport> {
        Ok(LoudnessReport {
            max_volume_db: -1.0,
            mean_volume_db: -14.0,
        })
    }

    async fn decode_check(&self, _path: &Path) -> Result<DecodeReport> {
        Ok(DecodeReport {
            ok: true,
            errors: Vec::new(),
        })
    }

    async fn black_frames(&self, _path: &Path) -> Result<BlackFrameReport> {
        Ok(BlackFrameReport::default())
    }
}
