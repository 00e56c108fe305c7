//! Database setup and repository selection

use anyhow::{Context, Result};
use cadence_core::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;

use super::repository::Repositories;

/// Setup database connection pool and run migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    // Workspace migrations/ relative to this crate
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Pick PostgreSQL or in-memory repositories from `DATABASE_URL`.
pub async fn create_repositories(config: &Config) -> Result<Repositories> {
    if config.uses_memory_database() {
        tracing::warn!("DATABASE_URL is memory:// - file records will not survive a restart");
        return Ok(Repositories::in_memory());
    }
    let pool = setup_database(config).await?;
    Ok(Repositories::postgres(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_url_selects_in_memory_repositories() {
        let config = Config::default();
        assert!(config.uses_memory_database());

        let repos = create_repositories(&config).await.unwrap();
        let missing = repos.files.find_by_id(uuid::Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }
}
