use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::file::FileStatus;

/// Provider-side acknowledgement of one uploaded part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub etag: Option<String>,
    pub part_number: i32,
    pub size: i64,
    /// SHA-256 of the part, hex encoded.
    pub checksum: Option<String>,
}

/// Bookkeeping row for one part of an in-flight multipart session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub id: Uuid,
    pub upload_id: String,
    pub chunk_number: i32,
    pub total_chunks: i32,
    /// Expected size of this chunk in bytes.
    pub chunk_size: i64,
    pub storage_key: String,
    pub metadata: ChunkMetadata,
    pub uploaded: bool,
    pub error: Option<String>,
    pub file_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileChunk {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Expected size of each chunk: all `chunk_size` except the last, which is the remainder.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<(i32, i64)> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let total_chunks = total_size.div_ceil(chunk_size);
    (1..=total_chunks)
        .map(|n| {
            let expected = if n == total_chunks {
                total_size - chunk_size * (total_chunks - 1)
            } else {
                chunk_size
            };
            (n as i32, expected as i64)
        })
        .collect()
}

/// Build the placeholder rows created at session initiation.
pub fn placeholder_chunks(
    file_id: Uuid,
    upload_id: &str,
    storage_key: &str,
    total_size: u64,
    chunk_size: u64,
    expiry: Duration,
) -> Vec<FileChunk> {
    let plan = plan_chunks(total_size, chunk_size);
    let total_chunks = plan.len() as i32;
    let now = Utc::now();
    plan.into_iter()
        .map(|(chunk_number, expected)| FileChunk {
            id: Uuid::new_v4(),
            upload_id: upload_id.to_string(),
            chunk_number,
            total_chunks,
            chunk_size: expected,
            storage_key: part_key(storage_key, upload_id, chunk_number),
            metadata: ChunkMetadata {
                part_number: chunk_number,
                ..ChunkMetadata::default()
            },
            uploaded: false,
            error: None,
            file_id,
            expires_at: now + expiry,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// Provider-scoped key of one part.
pub fn part_key(storage_key: &str, upload_id: &str, chunk_number: i32) -> String {
    format!("{}.parts/{}/part_{}", storage_key, upload_id, chunk_number)
}

/// Progress snapshot of a multipart session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadProgress {
    pub upload_id: String,
    pub file_id: Uuid,
    pub status: FileStatus,
    pub total_chunks: i32,
    pub uploaded_chunks: i32,
    pub total_size: i64,
    pub uploaded_bytes: i64,
    /// Chunk numbers still missing, ascending.
    pub missing_chunks: Vec<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UploadProgress {
    pub fn from_chunks(
        upload_id: &str,
        file_id: Uuid,
        status: FileStatus,
        total_size: i64,
        chunks: &[FileChunk],
    ) -> Self {
        let mut missing: Vec<i32> = chunks
            .iter()
            .filter(|c| !c.uploaded)
            .map(|c| c.chunk_number)
            .collect();
        missing.sort_unstable();
        UploadProgress {
            upload_id: upload_id.to_string(),
            file_id,
            status,
            total_chunks: chunks.first().map(|c| c.total_chunks).unwrap_or(0),
            uploaded_chunks: chunks.iter().filter(|c| c.uploaded).count() as i32,
            total_size,
            uploaded_bytes: chunks
                .iter()
                .filter(|c| c.uploaded)
                .map(|c| c.metadata.size)
                .sum(),
            missing_chunks: missing,
            expires_at: chunks.iter().map(|c| c.expires_at).min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_twelve_mib_in_five_mib_chunks() {
        let plan = plan_chunks(12 * MIB, 5 * MIB);
        assert_eq!(
            plan,
            vec![
                (1, (5 * MIB) as i64),
                (2, (5 * MIB) as i64),
                (3, (2 * MIB) as i64)
            ]
        );
    }

    #[test]
    fn test_plan_exact_multiple_and_tiny() {
        assert_eq!(plan_chunks(10, 5), vec![(1, 5), (2, 5)]);
        assert_eq!(plan_chunks(1, 5), vec![(1, 1)]);
        assert!(plan_chunks(0, 5).is_empty());
    }

    #[test]
    fn test_placeholders_share_session_fields() {
        let file_id = Uuid::new_v4();
        let chunks = placeholder_chunks(file_id, "up-1", "local/x/a.wav", 11, 5, Duration::hours(24));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.total_chunks == 3 && !c.uploaded));
        assert_eq!(chunks[2].chunk_size, 1);
        assert_eq!(chunks[1].storage_key, "local/x/a.wav.parts/up-1/part_2");
        assert_eq!(chunks[0].metadata.part_number, 1);
        assert!(!chunks[0].is_expired(Utc::now()));
    }

    #[test]
    fn test_progress_counts_uploaded_bytes() {
        let mut chunks = placeholder_chunks(Uuid::new_v4(), "u", "k", 12, 5, Duration::hours(1));
        chunks[1].uploaded = true;
        chunks[1].metadata.size = 5;
        let progress =
            UploadProgress::from_chunks("u", chunks[0].file_id, FileStatus::Pending, 12, &chunks);
        assert_eq!(progress.total_chunks, 3);
        assert_eq!(progress.uploaded_chunks, 1);
        assert_eq!(progress.uploaded_bytes, 5);
        assert_eq!(progress.missing_chunks, vec![1, 3]);
    }
}
