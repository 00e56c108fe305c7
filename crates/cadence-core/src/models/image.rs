use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file::{file_extension, FileBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Tiff,
    Unknown,
}

impl ImageFormat {
    pub fn from_mime_or_extension(mime_type: &str, filename: &str) -> Self {
        match mime_type.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => return ImageFormat::Jpeg,
            "image/png" => return ImageFormat::Png,
            "image/webp" => return ImageFormat::Webp,
            "image/gif" => return ImageFormat::Gif,
            "image/tiff" => return ImageFormat::Tiff,
            _ => {}
        }
        match file_extension(filename).as_deref() {
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            Some("png") => ImageFormat::Png,
            Some("webp") => ImageFormat::Webp,
            Some("gif") => ImageFormat::Gif,
            Some("tif") | Some("tiff") => ImageFormat::Tiff,
            _ => ImageFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "webp" => ImageFormat::Webp,
            "gif" => ImageFormat::Gif,
            "tiff" => ImageFormat::Tiff,
            _ => ImageFormat::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTechnical {
    pub format: ImageFormat,
    pub width: i32,
    pub height: i32,
    pub color_space: Option<String>,
    pub has_alpha: bool,
    pub channels: i32,
}

impl ImageTechnical {
    pub fn zeroed(format: ImageFormat) -> Self {
        Self {
            format,
            width: 0,
            height: 0,
            color_space: None,
            has_alpha: false,
            channels: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    #[serde(flatten)]
    pub base: FileBase,
    #[serde(flatten)]
    pub technical: ImageTechnical,
    pub master_id: Option<Uuid>,
}
