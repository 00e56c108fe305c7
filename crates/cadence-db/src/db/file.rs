use async_trait::async_trait;
use cadence_core::models::{
    AudioFormat, AudioTechnical, FileAsset, FileBase, FileKind, FileStatus, ImageFormat,
    ImageTechnical, StreamDescriptor, TechnicalMetadata, ValidationStatus, VideoFormat,
    VideoTechnical,
};
use cadence_core::AppError;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use uuid::Uuid;

use super::repository::FileRepository;

const BASE_COLUMNS: &str = "id, filename, original_filename, mime_type, size, path, bucket, key, \
    storage_key, status, validation_status, metadata, validation_results, processing_results, \
    is_public, owner_id, created_at, updated_at, deleted_at, last_accessed_at, download_count";
const BASE_COLUMN_COUNT: usize = 21;

const AUDIO_COLUMNS: &str = "format, codec, duration, bitrate, sample_rate, channels, bit_depth, \
    waveform, peak_db, mean_db, master_id";
const IMAGE_COLUMNS: &str = "format, width, height, color_space, has_alpha, channels, master_id";
const VIDEO_COLUMNS: &str = "format, duration, width, height, frame_rate, bitrate, video_codec, \
    audio_codec, streams, master_id";

fn table(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Audio => "audio_files",
        FileKind::Image => "image_files",
        FileKind::Video => "video_files",
    }
}

/// `$start, $start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|n| format!("${}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_base<'q>(
    query: Query<'q, Postgres, PgArguments>,
    base: &'q FileBase,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(base.id)
        .bind(&base.filename)
        .bind(&base.original_filename)
        .bind(&base.mime_type)
        .bind(base.size)
        .bind(&base.path)
        .bind(&base.bucket)
        .bind(&base.key)
        .bind(&base.storage_key)
        .bind(base.status)
        .bind(base.validation_status)
        .bind(&base.metadata)
        .bind(&base.validation_results)
        .bind(&base.processing_results)
        .bind(base.is_public)
        .bind(base.owner_id)
        .bind(base.created_at)
        .bind(base.updated_at)
        .bind(base.deleted_at)
        .bind(base.last_accessed_at)
        .bind(base.download_count)
}

fn base_from_row(row: &PgRow) -> Result<FileBase, sqlx::Error> {
    Ok(FileBase {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_filename: row.try_get("original_filename")?,
        mime_type: row.try_get("mime_type")?,
        size: row.try_get("size")?,
        path: row.try_get("path")?,
        bucket: row.try_get("bucket")?,
        key: row.try_get("key")?,
        storage_key: row.try_get("storage_key")?,
        status: row.try_get("status")?,
        validation_status: row.try_get("validation_status")?,
        metadata: row.try_get("metadata")?,
        validation_results: row.try_get("validation_results")?,
        processing_results: row.try_get("processing_results")?,
        is_public: row.try_get("is_public")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
        last_accessed_at: row.try_get("last_accessed_at")?,
        download_count: row.try_get("download_count")?,
    })
}

fn technical_from_row(kind: FileKind, row: &PgRow) -> Result<TechnicalMetadata, sqlx::Error> {
    let format: String = row.try_get("format")?;
    Ok(match kind {
        FileKind::Audio => TechnicalMetadata::Audio(AudioTechnical {
            format: AudioFormat::parse(&format),
            codec: row.try_get("codec")?,
            duration: row.try_get("duration")?,
            bitrate: row.try_get("bitrate")?,
            sample_rate: row.try_get("sample_rate")?,
            channels: row.try_get("channels")?,
            bit_depth: row.try_get("bit_depth")?,
            waveform: row
                .try_get::<Option<Json<Vec<f32>>>, _>("waveform")?
                .map(|json| json.0),
            peak_db: row.try_get("peak_db")?,
            mean_db: row.try_get("mean_db")?,
        }),
        FileKind::Image => TechnicalMetadata::Image(ImageTechnical {
            format: ImageFormat::parse(&format),
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            color_space: row.try_get("color_space")?,
            has_alpha: row.try_get("has_alpha")?,
            channels: row.try_get("channels")?,
        }),
        FileKind::Video => TechnicalMetadata::Video(VideoTechnical {
            format: VideoFormat::parse(&format),
            duration: row.try_get("duration")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            frame_rate: row.try_get("frame_rate")?,
            bitrate: row.try_get("bitrate")?,
            video_codec: row.try_get("video_codec")?,
            audio_codec: row.try_get("audio_codec")?,
            streams: row
                .try_get::<Json<Vec<StreamDescriptor>>, _>("streams")?
                .0,
        }),
    })
}

fn row_to_asset(kind: FileKind, row: &PgRow) -> Result<FileAsset, sqlx::Error> {
    Ok(FileAsset::from_parts(
        base_from_row(row)?,
        technical_from_row(kind, row)?,
        row.try_get("master_id")?,
    ))
}

/// PostgreSQL file repository
///
/// Table names come from [`FileKind`] only, never from input.
#[derive(Clone)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn kind_or_not_found(&self, id: Uuid) -> Result<FileKind, AppError> {
        self.find_kind(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn fetch(&self, kind: FileKind, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", table(kind));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_asset(kind, &r)).transpose()?)
    }

    /// Run an `UPDATE ... RETURNING *` against the file's kind table.
    async fn update_returning<'q>(
        &self,
        kind: FileKind,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<Option<FileAsset>, AppError> {
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_asset(kind, &r)).transpose()?)
    }

    async fn write_technical(
        conn: &mut PgConnection,
        id: Uuid,
        technical: &TechnicalMetadata,
    ) -> Result<(), AppError> {
        match technical {
            TechnicalMetadata::Audio(t) => {
                sqlx::query(
                    r#"
                    UPDATE audio_files
                    SET format = $2, codec = $3, duration = $4, bitrate = $5, sample_rate = $6,
                        channels = $7, bit_depth = $8, waveform = $9, peak_db = $10,
                        mean_db = $11, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(t.format.as_str())
                .bind(&t.codec)
                .bind(t.duration)
                .bind(t.bitrate)
                .bind(t.sample_rate)
                .bind(t.channels)
                .bind(t.bit_depth)
                .bind(t.waveform.as_ref().map(Json))
                .bind(t.peak_db)
                .bind(t.mean_db)
                .execute(&mut *conn)
                .await?;
            }
            TechnicalMetadata::Image(t) => {
                sqlx::query(
                    r#"
                    UPDATE image_files
                    SET format = $2, width = $3, height = $4, color_space = $5, has_alpha = $6,
                        channels = $7, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(t.format.as_str())
                .bind(t.width)
                .bind(t.height)
                .bind(&t.color_space)
                .bind(t.has_alpha)
                .bind(t.channels)
                .execute(&mut *conn)
                .await?;
            }
            TechnicalMetadata::Video(t) => {
                sqlx::query(
                    r#"
                    UPDATE video_files
                    SET format = $2, duration = $3, width = $4, height = $5, frame_rate = $6,
                        bitrate = $7, video_codec = $8, audio_codec = $9, streams = $10,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(t.format.as_str())
                .bind(t.duration)
                .bind(t.width)
                .bind(t.height)
                .bind(t.frame_rate)
                .bind(t.bitrate)
                .bind(&t.video_codec)
                .bind(&t.audio_codec)
                .bind(Json(&t.streams))
                .execute(&mut *conn)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileRepository for PostgresFileRepository {
    #[tracing::instrument(skip(self, file), fields(
        db.system = "postgresql",
        db.operation = "insert",
        file_id = %file.id(),
        kind = %file.kind()
    ))]
    async fn create(
        &self,
        file: &FileAsset,
        upload_id: Option<&str>,
    ) -> Result<FileAsset, AppError> {
        let kind = file.kind();
        let base = file.base();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO file_index (id, kind, upload_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(base.id)
        .bind(kind)
        .bind(upload_id)
        .bind(base.created_at)
        .execute(&mut *tx)
        .await?;

        let row = match file {
            FileAsset::Audio(audio) => {
                let t = &audio.technical;
                let sql = format!(
                    "INSERT INTO audio_files ({}, {}) VALUES ({}) RETURNING *",
                    BASE_COLUMNS,
                    AUDIO_COLUMNS,
                    placeholders(1, BASE_COLUMN_COUNT + 11)
                );
                bind_base(sqlx::query(&sql), base)
                    .bind(t.format.as_str())
                    .bind(&t.codec)
                    .bind(t.duration)
                    .bind(t.bitrate)
                    .bind(t.sample_rate)
                    .bind(t.channels)
                    .bind(t.bit_depth)
                    .bind(t.waveform.as_ref().map(Json))
                    .bind(t.peak_db)
                    .bind(t.mean_db)
                    .bind(audio.master_id)
                    .fetch_one(&mut *tx)
                    .await?
            }
            FileAsset::Image(image) => {
                let t = &image.technical;
                let sql = format!(
                    "INSERT INTO image_files ({}, {}) VALUES ({}) RETURNING *",
                    BASE_COLUMNS,
                    IMAGE_COLUMNS,
                    placeholders(1, BASE_COLUMN_COUNT + 7)
                );
                bind_base(sqlx::query(&sql), base)
                    .bind(t.format.as_str())
                    .bind(t.width)
                    .bind(t.height)
                    .bind(&t.color_space)
                    .bind(t.has_alpha)
                    .bind(t.channels)
                    .bind(image.master_id)
                    .fetch_one(&mut *tx)
                    .await?
            }
            FileAsset::Video(video) => {
                let t = &video.technical;
                let sql = format!(
                    "INSERT INTO video_files ({}, {}) VALUES ({}) RETURNING *",
                    BASE_COLUMNS,
                    VIDEO_COLUMNS,
                    placeholders(1, BASE_COLUMN_COUNT + 10)
                );
                bind_base(sqlx::query(&sql), base)
                    .bind(t.format.as_str())
                    .bind(t.duration)
                    .bind(t.width)
                    .bind(t.height)
                    .bind(t.frame_rate)
                    .bind(t.bitrate)
                    .bind(&t.video_codec)
                    .bind(&t.audio_codec)
                    .bind(Json(&t.streams))
                    .bind(video.master_id)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;

        Ok(row_to_asset(kind, &row)?)
    }

    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.operation = "select"))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        match self.find_kind(id).await? {
            Some(kind) => self.fetch(kind, id).await,
            None => Ok(None),
        }
    }

    async fn find_kind(&self, id: Uuid) -> Result<Option<FileKind>, AppError> {
        let kind = sqlx::query_scalar::<_, FileKind>("SELECT kind FROM file_index WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(kind)
    }

    async fn find_by_upload_id(&self, upload_id: &str) -> Result<Option<FileAsset>, AppError> {
        let row = sqlx::query("SELECT id, kind FROM file_index WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                let kind: FileKind = row.try_get("kind")?;
                self.fetch(kind, id).await
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.operation = "update"))]
    async fn transition_status(
        &self,
        id: Uuid,
        from: FileStatus,
        to: FileStatus,
    ) -> Result<Option<FileAsset>, AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "Illegal status transition {} -> {}",
                from, to
            )));
        }
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING *",
            table(kind)
        );
        self.update_returning(kind, sqlx::query(&sql).bind(id).bind(from).bind(to))
            .await
    }

    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.operation = "update"))]
    async fn mark_complete(
        &self,
        id: Uuid,
        path: &str,
        size: i64,
    ) -> Result<Option<FileAsset>, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET status = $2, path = $3, size = $4, updated_at = NOW() \
             WHERE id = $1 AND status = $5 RETURNING *",
            table(kind)
        );
        self.update_returning(
            kind,
            sqlx::query(&sql)
                .bind(id)
                .bind(FileStatus::Complete)
                .bind(path)
                .bind(size)
                .bind(FileStatus::Processing),
        )
        .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET status = $2, deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $3 RETURNING *",
            table(kind)
        );
        self.update_returning(
            kind,
            sqlx::query(&sql)
                .bind(id)
                .bind(FileStatus::Deleted)
                .bind(FileStatus::Complete),
        )
        .await
    }

    async fn update_location(
        &self,
        id: Uuid,
        key: &str,
        filename: &str,
        path: &str,
    ) -> Result<FileAsset, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET key = $2, filename = $3, path = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
            table(kind)
        );
        self.update_returning(
            kind,
            sqlx::query(&sql).bind(id).bind(key).bind(filename).bind(path),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    #[tracing::instrument(skip(self, patch), fields(db.system = "postgresql", db.operation = "update"))]
    async fn merge_metadata(
        &self,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> Result<FileAsset, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET metadata = metadata || $2::jsonb, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
            table(kind)
        );
        self.update_returning(kind, sqlx::query(&sql).bind(id).bind(patch))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn record_access(&self, id: Uuid) -> Result<FileAsset, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET last_accessed_at = NOW(), download_count = download_count + 1 \
             WHERE id = $1 RETURNING *",
            table(kind)
        );
        self.update_returning(kind, sqlx::query(&sql).bind(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))
    }

    async fn claim_validation(&self, id: Uuid) -> Result<Option<FileAsset>, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        let sql = format!(
            "UPDATE {} SET validation_status = $2, updated_at = NOW() \
             WHERE id = $1 AND validation_status = $3 AND status = $4 RETURNING *",
            table(kind)
        );
        self.update_returning(
            kind,
            sqlx::query(&sql)
                .bind(id)
                .bind(ValidationStatus::InProgress)
                .bind(ValidationStatus::Pending)
                .bind(FileStatus::Complete),
        )
        .await
    }

    #[tracing::instrument(skip(self, results, technical), fields(db.system = "postgresql", db.operation = "update"))]
    async fn finish_validation(
        &self,
        id: Uuid,
        status: ValidationStatus,
        results: &serde_json::Value,
        technical: Option<&TechnicalMetadata>,
    ) -> Result<Option<FileAsset>, AppError> {
        let kind = self.kind_or_not_found(id).await?;
        if let Some(technical) = technical {
            if technical.kind() != kind {
                return Err(AppError::InvalidInput(format!(
                    "Technical metadata for {} does not fit {} file {}",
                    technical.kind(),
                    kind,
                    id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE {} SET validation_status = $2, validation_results = $3, updated_at = NOW() \
             WHERE id = $1 AND validation_status = $4 RETURNING id",
            table(kind)
        );
        let finished = sqlx::query(&sql)
            .bind(id)
            .bind(status)
            .bind(results)
            .bind(ValidationStatus::InProgress)
            .fetch_optional(&mut *tx)
            .await?;
        if finished.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }
        if let Some(technical) = technical {
            Self::write_technical(&mut *tx, id, technical).await?;
        }
        tx.commit().await?;

        self.fetch(kind, id).await
    }

    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.operation = "update"))]
    async fn reset_stale_validations(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut reset = Vec::new();
        for kind in [FileKind::Audio, FileKind::Image, FileKind::Video] {
            let sql = format!(
                "UPDATE {} SET validation_status = $1, updated_at = NOW() \
                 WHERE validation_status = $2 AND updated_at < $3 RETURNING id",
                table(kind)
            );
            let ids = sqlx::query_scalar::<_, Uuid>(&sql)
                .bind(ValidationStatus::Pending)
                .bind(ValidationStatus::InProgress)
                .bind(stale_before)
                .fetch_all(&self.pool)
                .await?;
            reset.extend(ids);
        }
        Ok(reset)
    }

    async fn list_versions(&self, master_id: Uuid) -> Result<Vec<FileAsset>, AppError> {
        let kind = self.kind_or_not_found(master_id).await?;
        let sql = format!(
            "SELECT * FROM {} WHERE master_id = $1 AND status <> $2 ORDER BY created_at",
            table(kind)
        );
        let rows = sqlx::query(&sql)
            .bind(master_id)
            .bind(FileStatus::Deleted)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| row_to_asset(kind, r))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_awaiting_validation(&self, limit: i64) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM (
                SELECT id, created_at FROM audio_files
                WHERE status = 'complete' AND validation_status = 'pending'
                UNION ALL
                SELECT id, created_at FROM image_files
                WHERE status = 'complete' AND validation_status = 'pending'
                UNION ALL
                SELECT id, created_at FROM video_files
                WHERE status = 'complete' AND validation_status = 'pending'
            ) awaiting
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.operation = "delete"))]
    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        // Kind row and chunk rows cascade from the index.
        let result = sqlx::query("DELETE FROM file_index WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(4, 1), "$4");
    }

    #[test]
    fn test_insert_column_counts_match_placeholders() {
        let count = |cols: &str| cols.split(',').count();
        assert_eq!(count(BASE_COLUMNS), BASE_COLUMN_COUNT);
        assert_eq!(count(AUDIO_COLUMNS), 11);
        assert_eq!(count(IMAGE_COLUMNS), 7);
        assert_eq!(count(VIDEO_COLUMNS), 10);
    }

    #[test]
    fn test_table_per_kind() {
        assert_eq!(table(FileKind::Audio), "audio_files");
        assert_eq!(table(FileKind::Image), "image_files");
        assert_eq!(table(FileKind::Video), "video_files");
    }
}
