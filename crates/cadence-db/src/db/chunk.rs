use async_trait::async_trait;
use cadence_core::models::{ChunkMetadata, FileChunk};
use cadence_core::AppError;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::repository::{ChunkRepository, ExpiredSession};

/// Repository for multipart chunk bookkeeping
#[derive(Clone)]
pub struct PostgresChunkRepository {
    pool: PgPool,
}

impl PostgresChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_chunk(row: &PgRow) -> Result<FileChunk, sqlx::Error> {
    Ok(FileChunk {
        id: row.try_get("id")?,
        upload_id: row.try_get("upload_id")?,
        chunk_number: row.try_get("chunk_number")?,
        total_chunks: row.try_get("total_chunks")?,
        chunk_size: row.try_get("chunk_size")?,
        storage_key: row.try_get("storage_key")?,
        metadata: row.try_get::<Json<ChunkMetadata>, _>("metadata")?.0,
        uploaded: row.try_get("uploaded")?,
        error: row.try_get("error")?,
        file_id: row.try_get("file_id")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ChunkRepository for PostgresChunkRepository {
    #[tracing::instrument(skip(self, chunks), fields(
        db.system = "postgresql",
        db.table = "file_chunks",
        db.operation = "insert",
        count = chunks.len()
    ))]
    async fn create_many(&self, chunks: &[FileChunk]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO file_chunks (
                    id, upload_id, chunk_number, total_chunks, chunk_size, storage_key,
                    metadata, uploaded, error, file_id, expires_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(chunk.id)
            .bind(&chunk.upload_id)
            .bind(chunk.chunk_number)
            .bind(chunk.total_chunks)
            .bind(chunk.chunk_size)
            .bind(&chunk.storage_key)
            .bind(Json(&chunk.metadata))
            .bind(chunk.uploaded)
            .bind(&chunk.error)
            .bind(chunk.file_id)
            .bind(chunk.expires_at)
            .bind(chunk.created_at)
            .bind(chunk.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_upload(&self, upload_id: &str) -> Result<Vec<FileChunk>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM file_chunks
            WHERE upload_id = $1
            ORDER BY chunk_number
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(row_to_chunk)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_chunk(
        &self,
        upload_id: &str,
        chunk_number: i32,
    ) -> Result<Option<FileChunk>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM file_chunks WHERE upload_id = $1 AND chunk_number = $2",
        )
        .bind(upload_id)
        .bind(chunk_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_chunk).transpose()?)
    }

    #[tracing::instrument(skip(self, metadata), fields(
        db.system = "postgresql",
        db.table = "file_chunks",
        db.operation = "update"
    ))]
    async fn mark_uploaded(
        &self,
        upload_id: &str,
        chunk_number: i32,
        metadata: &ChunkMetadata,
    ) -> Result<FileChunk, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE file_chunks
            SET uploaded = TRUE, error = NULL, metadata = $3, updated_at = NOW()
            WHERE upload_id = $1 AND chunk_number = $2
            RETURNING *
            "#,
        )
        .bind(upload_id)
        .bind(chunk_number)
        .bind(Json(metadata))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Chunk {} of upload {} not found",
                chunk_number, upload_id
            ))
        })?;

        Ok(row_to_chunk(&row)?)
    }

    async fn mark_failed(
        &self,
        upload_id: &str,
        chunk_number: i32,
        error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE file_chunks
            SET uploaded = FALSE, error = $3, updated_at = NOW()
            WHERE upload_id = $1 AND chunk_number = $2
            "#,
        )
        .bind(upload_id)
        .bind(chunk_number)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_uploaded(&self, upload_id: &str) -> Result<(i64, i64), AppError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) FILTER (WHERE uploaded) AS uploaded, COUNT(*) AS total
            FROM file_chunks
            WHERE upload_id = $1
            "#,
        )
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.try_get("uploaded")?, row.try_get("total")?))
    }

    async fn delete_by_upload(&self, upload_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM file_chunks WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExpiredSession>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT upload_id, file_id
            FROM file_chunks
            GROUP BY upload_id, file_id
            HAVING MIN(expires_at) <= $1
            ORDER BY MIN(expires_at)
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ExpiredSession {
                    upload_id: row.try_get("upload_id")?,
                    file_id: row.try_get("file_id")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(AppError::from)
    }
}
