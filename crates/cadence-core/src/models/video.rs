use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file::{file_extension, FileBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Mov,
    Webm,
    Mkv,
    Unknown,
}

impl VideoFormat {
    pub fn from_mime_or_extension(mime_type: &str, filename: &str) -> Self {
        match mime_type.to_lowercase().as_str() {
            "video/mp4" | "video/x-m4v" => return VideoFormat::Mp4,
            "video/quicktime" => return VideoFormat::Mov,
            "video/webm" => return VideoFormat::Webm,
            "video/x-matroska" => return VideoFormat::Mkv,
            _ => {}
        }
        match file_extension(filename).as_deref() {
            Some("mp4") | Some("m4v") => VideoFormat::Mp4,
            Some("mov") => VideoFormat::Mov,
            Some("webm") => VideoFormat::Webm,
            Some("mkv") => VideoFormat::Mkv,
            _ => VideoFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mov => "mov",
            VideoFormat::Webm => "webm",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "mp4" => VideoFormat::Mp4,
            "mov" => VideoFormat::Mov,
            "webm" => VideoFormat::Webm,
            "mkv" => VideoFormat::Mkv,
            _ => VideoFormat::Unknown,
        }
    }
}

/// One elementary stream as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub index: i32,
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub profile: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub frame_rate: Option<f64>,
    pub bit_rate: Option<i64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTechnical {
    pub format: VideoFormat,
    pub duration: f64,
    pub width: i32,
    pub height: i32,
    pub frame_rate: f64,
    pub bitrate: i64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub streams: Vec<StreamDescriptor>,
}

impl VideoTechnical {
    pub fn zeroed(format: VideoFormat) -> Self {
        Self {
            format,
            duration: 0.0,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            bitrate: 0,
            video_codec: None,
            audio_codec: None,
            streams: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFile {
    #[serde(flatten)]
    pub base: FileBase,
    #[serde(flatten)]
    pub technical: VideoTechnical,
    pub master_id: Option<Uuid>,
}
