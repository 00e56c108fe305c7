use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Technical category of a stored asset. Determines the concrete record shape
/// and which validation rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Image,
    Video,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Image => "image",
            FileKind::Video => "video",
        }
    }

    /// Kind from the top-level MIME type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let top = content_type.split('/').next()?.trim().to_lowercase();
        match top.as_str() {
            "audio" => Some(FileKind::Audio),
            "image" => Some(FileKind::Image),
            "video" => Some(FileKind::Video),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "flac" | "mp3" | "aac" | "m4a" | "ogg" | "aif" | "aiff" => {
                Some(FileKind::Audio)
            }
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "tif" | "tiff" => Some(FileKind::Image),
            "mp4" | "mov" | "m4v" | "webm" | "mkv" => Some(FileKind::Video),
            _ => None,
        }
    }

    /// Resolve a kind from MIME first, then from the filename extension.
    pub fn detect(content_type: &str, filename: &str) -> Option<Self> {
        Self::from_content_type(content_type)
            .or_else(|| file_extension(filename).and_then(|ext| Self::from_extension(&ext)))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(FileKind::Audio),
            "image" => Ok(FileKind::Image),
            "video" => Ok(FileKind::Video),
            other => Err(format!("unknown file kind: {}", other)),
        }
    }
}

/// Upload lifecycle of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "lowercase")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    Processing,
    Complete,
    Failed,
    Deleted,
}

impl FileStatus {
    /// Allowed edges of the upload state machine.
    ///
    /// `Pending -> Failed` covers cancelled and expired sessions that never
    /// reached finalize.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Processing)
                | (FileStatus::Pending, FileStatus::Failed)
                | (FileStatus::Processing, FileStatus::Complete)
                | (FileStatus::Processing, FileStatus::Failed)
                | (FileStatus::Complete, FileStatus::Deleted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "PENDING",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Complete => "COMPLETE",
            FileStatus::Failed => "FAILED",
            FileStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content validation state, advanced independently of [`FileStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "validation_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ValidationStatus::Passed | ValidationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::InProgress => "IN_PROGRESS",
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns shared by every kind-specific record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileBase {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    /// Provider URL or path of the durable object; empty until COMPLETE.
    pub path: String,
    pub bucket: String,
    /// Provider key the bytes live under.
    pub key: String,
    /// Immutable identity minted at creation.
    pub storage_key: String,
    pub status: FileStatus,
    pub validation_status: ValidationStatus,
    pub metadata: serde_json::Value,
    pub validation_results: serde_json::Value,
    pub processing_results: serde_json::Value,
    pub is_public: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub download_count: i64,
}

/// Inputs needed to mint a new PENDING record.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub bucket: String,
    pub key: String,
    pub owner_id: Uuid,
    pub is_public: bool,
    pub metadata: serde_json::Value,
}

impl FileBase {
    pub fn new(input: NewFile) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let filename = input
            .key
            .rsplit('/')
            .next()
            .unwrap_or(input.key.as_str())
            .to_string();
        let metadata = if input.metadata.is_object() {
            input.metadata
        } else {
            serde_json::json!({})
        };
        Self {
            id,
            filename,
            storage_key: generate_storage_key(&input.bucket, id, &input.original_filename),
            original_filename: input.original_filename,
            mime_type: input.mime_type,
            size: input.size,
            path: String::new(),
            bucket: input.bucket,
            key: input.key,
            status: FileStatus::Pending,
            validation_status: ValidationStatus::Pending,
            metadata,
            validation_results: serde_json::json!({}),
            processing_results: serde_json::json!({}),
            is_public: input.is_public,
            owner_id: input.owner_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_accessed_at: None,
            download_count: 0,
        }
    }

    /// Owner match or public visibility.
    pub fn is_accessible_by(&self, requester: Uuid) -> bool {
        self.owner_id == requester || self.is_public
    }

    pub fn is_owned_by(&self, requester: Uuid) -> bool {
        self.owner_id == requester
    }

    pub fn is_deleted(&self) -> bool {
        self.status == FileStatus::Deleted || self.deleted_at.is_some()
    }
}

/// `bucket/random-id/sanitized-name`, generated exactly once per record.
pub fn generate_storage_key(bucket: &str, id: Uuid, original_filename: &str) -> String {
    format!(
        "{}/{}/{}",
        bucket.trim_matches('/'),
        id.simple(),
        sanitize_filename(original_filename)
    )
}

/// Keep ASCII alphanumerics, dot, dash and underscore; collapse the rest.
/// Runs of dots collapse to one so a name can never form a `..` segment.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c == '.' {
            if !out.ends_with('.') {
                out.push(c);
            }
        } else if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(name: &str) -> FileBase {
        FileBase::new(NewFile {
            original_filename: name.to_string(),
            mime_type: "audio/wav".to_string(),
            size: 10,
            bucket: "local".to_string(),
            key: format!("audio/abc/{}", name),
            owner_id: Uuid::new_v4(),
            is_public: false,
            metadata: serde_json::Value::Null,
        })
    }

    #[test]
    fn test_status_transitions() {
        assert!(FileStatus::Pending.can_transition_to(FileStatus::Processing));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Complete));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Failed));
        assert!(FileStatus::Complete.can_transition_to(FileStatus::Deleted));
        assert!(!FileStatus::Pending.can_transition_to(FileStatus::Complete));
        assert!(!FileStatus::Failed.can_transition_to(FileStatus::Deleted));
        assert!(!FileStatus::Complete.can_transition_to(FileStatus::Processing));
    }

    #[test]
    fn test_new_file_starts_pending_with_storage_key() {
        let file = new_file("Master Take #1.wav");
        assert_eq!(file.status, FileStatus::Pending);
        assert_eq!(file.validation_status, ValidationStatus::Pending);
        assert!(file.path.is_empty());
        assert_eq!(file.filename, "Master Take #1.wav");
        assert!(file
            .storage_key
            .starts_with(&format!("local/{}/", file.id.simple())));
        assert!(file.storage_key.ends_with("Master_Take_1.wav"));
        assert!(file.metadata.is_object());
    }

    #[test]
    fn test_access_rules() {
        let mut file = new_file("a.wav");
        let stranger = Uuid::new_v4();
        assert!(file.is_accessible_by(file.owner_id));
        assert!(!file.is_accessible_by(stranger));
        file.is_public = true;
        assert!(file.is_accessible_by(stranger));
        assert!(!file.is_owned_by(stranger));
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(FileKind::detect("audio/flac", "x"), Some(FileKind::Audio));
        assert_eq!(
            FileKind::detect("application/octet-stream", "cover.PNG"),
            Some(FileKind::Image)
        );
        assert_eq!(FileKind::detect("application/pdf", "doc.pdf"), None);
        assert_eq!("Video".parse::<FileKind>(), Ok(FileKind::Video));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("My Song (final).mp3"), "My_Song_final_.mp3");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename("Intro...Outro.wav"), "Intro.Outro.wav");
        assert_eq!(sanitize_filename("Mix..v2.wav"), "Mix.v2.wav");
        assert_eq!(file_extension("track.WAV"), Some("wav".to_string()));
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ValidationStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let json = serde_json::to_string(&FileStatus::Complete).unwrap();
        assert_eq!(json, "\"COMPLETE\"");
    }
}
