//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use cadence_core::Config;
use cadence_db::{create_repositories, Repositories};
use cadence_services::{
    create_storage, CleanupService, FfmpegInspector, FileValidationService, MediaInspector,
    StorageProvider, StorageService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry();

    tracing::info!(
        environment = %config.environment,
        backend = ?config.storage.backend,
        "Configuration loaded and validated successfully"
    );

    let repositories = create_repositories(&config).await?;

    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize storage backend")?;

    let inspector = FfmpegInspector::new(
        config.validation.ffprobe_path.clone(),
        config.validation.ffmpeg_path.clone(),
    )
    .context("Invalid ffprobe/ffmpeg configuration")?;

    let state = build_state(config, storage, &repositories, Arc::new(inspector));
    let router = routes::setup_routes(&state.config, state.clone());

    Ok((state, router))
}

/// Wire the services around one provider and one set of repositories.
pub fn build_state(
    config: Config,
    storage: Arc<dyn StorageProvider>,
    repositories: &Repositories,
    inspector: Arc<dyn MediaInspector>,
) -> Arc<AppState> {
    let validation = Arc::new(FileValidationService::new(
        repositories.files.clone(),
        storage.clone(),
        inspector,
        config.validation.thresholds.clone(),
        config.validation.max_concurrency,
    )
    .with_stale_after(Duration::from_secs(config.validation.stale_after_secs)));

    let service = StorageService::new(storage, repositories, &config)
        .with_validation_queue(validation.queue());

    let cleanup = Arc::new(CleanupService::new(
        service.clone(),
        repositories,
        Duration::from_secs(config.cleanup_interval_secs),
    ));

    Arc::new(AppState {
        config,
        storage: service,
        validation,
        cleanup,
    })
}

/// Start the validation worker and the session sweep; both stop when `shutdown` flips to true.
pub fn start_workers(state: &AppState, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let mut handles = vec![state.validation.clone().start(shutdown.clone())];

    if state.config.cleanup_interval_secs > 0 {
        tracing::info!(
            interval_secs = state.config.cleanup_interval_secs,
            "Starting expired upload session sweep"
        );
        handles.push(state.cleanup.clone().start(shutdown));
    } else {
        tracing::info!("Expired upload session sweep disabled");
    }

    handles
}
