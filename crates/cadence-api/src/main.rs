use cadence_api::setup;
use cadence_core::Config;
use std::time::Duration;
use tokio::sync::watch;

/// Time running validations get to finish after the server stops.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = setup::initialize_app(config.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = setup::start_workers(&state, shutdown_rx);

    setup::server::start_server(&config, router, shutdown_tx).await?;

    let drained = tokio::time::timeout(
        WORKER_SHUTDOWN_GRACE,
        futures::future::join_all(workers),
    )
    .await;
    match drained {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Background worker panicked");
                }
            }
            tracing::info!("Background workers stopped");
        }
        Err(_) => tracing::warn!("Background workers did not stop in time"),
    }

    Ok(())
}
