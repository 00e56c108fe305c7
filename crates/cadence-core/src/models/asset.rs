//! Kind-tagged view over the three concrete file records.
//!
//! Callers carry a `kind` tag plus the kind-specific payload; persistence keeps
//! one table per kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::audio::{AudioFile, AudioFormat, AudioTechnical};
use super::file::{FileBase, FileKind, FileStatus, ValidationStatus};
use super::image::{ImageFile, ImageFormat, ImageTechnical};
use super::video::{VideoFile, VideoFormat, VideoTechnical};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileAsset {
    Audio(AudioFile),
    Image(ImageFile),
    Video(VideoFile),
}

/// Technical attributes produced by inspection, one shape per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TechnicalMetadata {
    Audio(AudioTechnical),
    Image(ImageTechnical),
    Video(VideoTechnical),
}

impl TechnicalMetadata {
    /// Zeroed technical fields with the format derived from MIME/extension.
    pub fn zeroed(kind: FileKind, mime_type: &str, filename: &str) -> Self {
        match kind {
            FileKind::Audio => TechnicalMetadata::Audio(AudioTechnical::zeroed(
                AudioFormat::from_mime_or_extension(mime_type, filename),
            )),
            FileKind::Image => TechnicalMetadata::Image(ImageTechnical::zeroed(
                ImageFormat::from_mime_or_extension(mime_type, filename),
            )),
            FileKind::Video => TechnicalMetadata::Video(VideoTechnical::zeroed(
                VideoFormat::from_mime_or_extension(mime_type, filename),
            )),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            TechnicalMetadata::Audio(_) => FileKind::Audio,
            TechnicalMetadata::Image(_) => FileKind::Image,
            TechnicalMetadata::Video(_) => FileKind::Video,
        }
    }
}

impl FileAsset {
    pub fn from_parts(
        base: FileBase,
        technical: TechnicalMetadata,
        master_id: Option<Uuid>,
    ) -> Self {
        match technical {
            TechnicalMetadata::Audio(technical) => FileAsset::Audio(AudioFile {
                base,
                technical,
                master_id,
            }),
            TechnicalMetadata::Image(technical) => FileAsset::Image(ImageFile {
                base,
                technical,
                master_id,
            }),
            TechnicalMetadata::Video(technical) => FileAsset::Video(VideoFile {
                base,
                technical,
                master_id,
            }),
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            FileAsset::Audio(_) => FileKind::Audio,
            FileAsset::Image(_) => FileKind::Image,
            FileAsset::Video(_) => FileKind::Video,
        }
    }

    pub fn base(&self) -> &FileBase {
        match self {
            FileAsset::Audio(f) => &f.base,
            FileAsset::Image(f) => &f.base,
            FileAsset::Video(f) => &f.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut FileBase {
        match self {
            FileAsset::Audio(f) => &mut f.base,
            FileAsset::Image(f) => &mut f.base,
            FileAsset::Video(f) => &mut f.base,
        }
    }

    pub fn id(&self) -> Uuid {
        self.base().id
    }

    pub fn master_id(&self) -> Option<Uuid> {
        match self {
            FileAsset::Audio(f) => f.master_id,
            FileAsset::Image(f) => f.master_id,
            FileAsset::Video(f) => f.master_id,
        }
    }

    pub fn technical(&self) -> TechnicalMetadata {
        match self {
            FileAsset::Audio(f) => TechnicalMetadata::Audio(f.technical.clone()),
            FileAsset::Image(f) => TechnicalMetadata::Image(f.technical.clone()),
            FileAsset::Video(f) => TechnicalMetadata::Video(f.technical.clone()),
        }
    }

    /// Replace the technical fields; a mismatched kind is ignored and reported.
    pub fn apply_technical(&mut self, technical: TechnicalMetadata) -> bool {
        match (self, technical) {
            (FileAsset::Audio(f), TechnicalMetadata::Audio(t)) => f.technical = t,
            (FileAsset::Image(f), TechnicalMetadata::Image(t)) => f.technical = t,
            (FileAsset::Video(f), TechnicalMetadata::Video(t)) => f.technical = t,
            _ => return false,
        }
        true
    }
}

/// Flat response shape for the HTTP boundary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    pub id: Uuid,
    pub kind: FileKind,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub key: String,
    pub path: String,
    pub storage_key: String,
    pub status: FileStatus,
    pub validation_status: ValidationStatus,
    pub is_public: bool,
    pub owner_id: Uuid,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    /// Kind-specific technical attributes.
    #[schema(value_type = Object)]
    pub technical: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_id: Option<Uuid>,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&FileAsset> for FileResponse {
    fn from(asset: &FileAsset) -> Self {
        let base = asset.base();
        let technical = match asset {
            FileAsset::Audio(f) => serde_json::to_value(&f.technical),
            FileAsset::Image(f) => serde_json::to_value(&f.technical),
            FileAsset::Video(f) => serde_json::to_value(&f.technical),
        }
        .unwrap_or(serde_json::Value::Null);
        FileResponse {
            id: base.id,
            kind: asset.kind(),
            filename: base.filename.clone(),
            original_filename: base.original_filename.clone(),
            mime_type: base.mime_type.clone(),
            size: base.size,
            key: base.key.clone(),
            path: base.path.clone(),
            storage_key: base.storage_key.clone(),
            status: base.status,
            validation_status: base.validation_status,
            is_public: base.is_public,
            owner_id: base.owner_id,
            metadata: base.metadata.clone(),
            technical,
            master_id: asset.master_id(),
            download_count: base.download_count,
            created_at: base.created_at,
            updated_at: base.updated_at,
        }
    }
}

impl From<FileAsset> for FileResponse {
    fn from(asset: FileAsset) -> Self {
        FileResponse::from(&asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::NewFile;

    fn base(mime: &str, name: &str) -> FileBase {
        FileBase::new(NewFile {
            original_filename: name.to_string(),
            mime_type: mime.to_string(),
            size: 42,
            bucket: "local".to_string(),
            key: format!("k/{}", name),
            owner_id: Uuid::new_v4(),
            is_public: false,
            metadata: serde_json::json!({"genre": "ambient"}),
        })
    }

    #[test]
    fn test_zeroed_technical_matches_kind() {
        let technical = TechnicalMetadata::zeroed(FileKind::Image, "image/png", "cover.png");
        assert_eq!(technical.kind(), FileKind::Image);
        match technical {
            TechnicalMetadata::Image(t) => {
                assert_eq!(t.format, ImageFormat::Png);
                assert_eq!(t.width, 0);
            }
            other => panic!("unexpected technical metadata: {:?}", other),
        }
    }

    #[test]
    fn test_tagged_serialization() {
        let asset = FileAsset::from_parts(
            base("audio/flac", "song.flac"),
            TechnicalMetadata::zeroed(FileKind::Audio, "audio/flac", "song.flac"),
            None,
        );
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["format"], "flac");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["originalFilename"], "song.flac");

        let back: FileAsset = serde_json::from_value(json).unwrap();
        assert_eq!(back, asset);
    }

    #[test]
    fn test_apply_technical_rejects_other_kind() {
        let mut asset = FileAsset::from_parts(
            base("video/mp4", "clip.mp4"),
            TechnicalMetadata::zeroed(FileKind::Video, "video/mp4", "clip.mp4"),
            None,
        );
        let audio = TechnicalMetadata::zeroed(FileKind::Audio, "audio/wav", "a.wav");
        assert!(!asset.apply_technical(audio));

        let mut video = VideoTechnical::zeroed(VideoFormat::Mp4);
        video.width = 1920;
        assert!(asset.apply_technical(TechnicalMetadata::Video(video)));
        match &asset {
            FileAsset::Video(v) => assert_eq!(v.technical.width, 1920),
            other => panic!("unexpected asset: {:?}", other),
        }
    }

    #[test]
    fn test_response_carries_technical_payload() {
        let asset = FileAsset::from_parts(
            base("image/jpeg", "art.jpg"),
            TechnicalMetadata::zeroed(FileKind::Image, "image/jpeg", "art.jpg"),
            Some(Uuid::nil()),
        );
        let response = FileResponse::from(&asset);
        assert_eq!(response.kind, FileKind::Image);
        assert_eq!(response.technical["format"], "jpeg");
        assert_eq!(response.master_id, Some(Uuid::nil()));
    }
}
