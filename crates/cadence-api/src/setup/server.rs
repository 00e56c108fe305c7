//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use cadence_core::Config;
use tokio::sync::watch;

/// Serve until SIGINT/SIGTERM, then tell the background workers to stop.
pub async fn start_server(config: &Config, app: Router, shutdown: watch::Sender<bool>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port);
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        backend = ?config.storage.backend,
        chunk_size_bytes = config.upload.chunk_size_bytes,
        max_audio_mb = config.upload.audio.max_file_size / 1024 / 1024,
        max_image_mb = config.upload.image.max_file_size / 1024 / 1024,
        max_video_mb = config.upload.video.max_file_size / 1024 / 1024,
        validation_concurrency = config.validation.max_concurrency,
        "Server ready and accepting connections"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if shutdown.send(true).is_err() {
        tracing::debug!("No background workers were listening for shutdown");
    }

    served?;
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
///
/// If a handler cannot be installed that signal is ignored and the other one
/// still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
