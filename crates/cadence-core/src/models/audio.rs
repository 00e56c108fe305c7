use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file::{file_extension, FileBase};

/// Container format of an audio asset, derived at upload from MIME/extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Flac,
    Mp3,
    Aac,
    Ogg,
    Aiff,
    Unknown,
}

impl AudioFormat {
    pub fn from_mime_or_extension(mime_type: &str, filename: &str) -> Self {
        let by_mime = match mime_type.to_lowercase().as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => AudioFormat::Wav,
            "audio/flac" | "audio/x-flac" => AudioFormat::Flac,
            "audio/mpeg" | "audio/mp3" => AudioFormat::Mp3,
            "audio/aac" | "audio/mp4" | "audio/x-m4a" => AudioFormat::Aac,
            "audio/ogg" => AudioFormat::Ogg,
            "audio/aiff" | "audio/x-aiff" => AudioFormat::Aiff,
            _ => AudioFormat::Unknown,
        };
        if by_mime != AudioFormat::Unknown {
            return by_mime;
        }
        match file_extension(filename).as_deref() {
            Some("wav") => AudioFormat::Wav,
            Some("flac") => AudioFormat::Flac,
            Some("mp3") => AudioFormat::Mp3,
            Some("aac") | Some("m4a") => AudioFormat::Aac,
            Some("ogg") => AudioFormat::Ogg,
            Some("aif") | Some("aiff") => AudioFormat::Aiff,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Aiff => "aiff",
            AudioFormat::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "wav" => AudioFormat::Wav,
            "flac" => AudioFormat::Flac,
            "mp3" => AudioFormat::Mp3,
            "aac" => AudioFormat::Aac,
            "ogg" => AudioFormat::Ogg,
            "aiff" => AudioFormat::Aiff,
            _ => AudioFormat::Unknown,
        }
    }
}

/// Technical attributes of an audio asset. Zeroed at creation and back-filled
/// by the validation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTechnical {
    pub format: AudioFormat,
    pub codec: Option<String>,
    pub duration: f64,
    /// Bits per second.
    pub bitrate: i64,
    pub sample_rate: i32,
    pub channels: i32,
    pub bit_depth: Option<i32>,
    /// Downsampled amplitude envelope; only present once a rendition step produces one.
    pub waveform: Option<Vec<f32>>,
    pub peak_db: Option<f64>,
    pub mean_db: Option<f64>,
}

impl AudioTechnical {
    pub fn zeroed(format: AudioFormat) -> Self {
        Self {
            format,
            codec: None,
            duration: 0.0,
            bitrate: 0,
            sample_rate: 0,
            channels: 0,
            bit_depth: None,
            waveform: None,
            peak_db: None,
            mean_db: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFile {
    #[serde(flatten)]
    pub base: FileBase,
    #[serde(flatten)]
    pub technical: AudioTechnical,
    /// Master recording this file is a version of.
    pub master_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime_then_extension() {
        assert_eq!(
            AudioFormat::from_mime_or_extension("audio/x-wav", "take.bin"),
            AudioFormat::Wav
        );
        assert_eq!(
            AudioFormat::from_mime_or_extension("application/octet-stream", "take.FLAC"),
            AudioFormat::Flac
        );
        assert_eq!(
            AudioFormat::from_mime_or_extension("application/octet-stream", "take"),
            AudioFormat::Unknown
        );
        assert_eq!(AudioFormat::parse(AudioFormat::Aiff.as_str()), AudioFormat::Aiff);
    }
}
