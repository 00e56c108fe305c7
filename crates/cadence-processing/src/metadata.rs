//! Reports produced by media inspection.
//!
//! `ProbeReport` mirrors the JSON printed by
//! `ffprobe -print_format json -show_format -show_streams`; numeric fields that
//! ffprobe emits as strings are parsed on access.

use cadence_core::models::{
    AudioFormat, AudioTechnical, StreamDescriptor, VideoFormat, VideoTechnical,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProbeReport {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub profile: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<i32>,
    pub bits_per_sample: Option<i32>,
    pub bits_per_raw_sample: Option<String>,
    pub duration: Option<String>,
}

impl ProbeReport {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"))
    }

    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    }

    /// Container duration, falling back to the longest stream.
    pub fn duration(&self) -> Option<f64> {
        parse_f64(self.format.duration.as_deref()).or_else(|| {
            self.streams
                .iter()
                .filter_map(|s| parse_f64(s.duration.as_deref()))
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        })
    }

    /// Overall bitrate in bits per second.
    pub fn bit_rate(&self) -> Option<i64> {
        parse_i64(self.format.bit_rate.as_deref())
    }

    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.streams.iter().map(ProbeStream::descriptor).collect()
    }

    /// Technical fields of an audio asset. Missing values stay zeroed.
    pub fn to_audio_technical(&self, format: AudioFormat) -> AudioTechnical {
        let mut technical = AudioTechnical::zeroed(format);
        technical.duration = self.duration().unwrap_or(0.0);
        let stream = self.audio_stream();
        technical.bitrate = self
            .bit_rate()
            .or_else(|| stream.and_then(|s| parse_i64(s.bit_rate.as_deref())))
            .unwrap_or(0);
        if let Some(stream) = stream {
            technical.codec = stream.codec_name.clone();
            technical.sample_rate = parse_i64(stream.sample_rate.as_deref()).unwrap_or(0) as i32;
            technical.channels = stream.channels.unwrap_or(0);
            technical.bit_depth = stream.bit_depth();
        }
        technical
    }

    pub fn to_video_technical(&self, format: VideoFormat) -> VideoTechnical {
        let mut technical = VideoTechnical::zeroed(format);
        technical.duration = self.duration().unwrap_or(0.0);
        technical.bitrate = self.bit_rate().unwrap_or(0);
        if let Some(video) = self.video_stream() {
            technical.width = video.width.unwrap_or(0);
            technical.height = video.height.unwrap_or(0);
            technical.frame_rate = video.frame_rate().unwrap_or(0.0);
            technical.video_codec = video.codec_name.clone();
            if technical.bitrate == 0 {
                technical.bitrate = parse_i64(video.bit_rate.as_deref()).unwrap_or(0);
            }
        }
        technical.audio_codec = self.audio_stream().and_then(|s| s.codec_name.clone());
        technical.streams = self.descriptors();
        technical
    }
}

impl ProbeStream {
    /// Average frame rate when known, else the container's nominal rate.
    pub fn frame_rate(&self) -> Option<f64> {
        self.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| self.r_frame_rate.as_deref().and_then(parse_frame_rate))
    }

    pub fn bit_depth(&self) -> Option<i32> {
        self.bits_per_raw_sample
            .as_deref()
            .and_then(|b| b.parse::<i32>().ok())
            .or(self.bits_per_sample)
            .filter(|b| *b > 0)
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            index: self.index,
            codec_type: self
                .codec_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            codec_name: self.codec_name.clone(),
            profile: self.profile.clone(),
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate(),
            bit_rate: parse_i64(self.bit_rate.as_deref()),
            sample_rate: parse_i64(self.sample_rate.as_deref()).map(|r| r as i32),
            channels: self.channels,
        }
    }
}

/// Parse ffprobe rationals such as `30000/1001`; `0/0` means unknown.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 || num == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => value.trim().parse().ok().filter(|r: &f64| *r > 0.0),
    }
}

fn parse_f64(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

fn parse_i64(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

/// Output of ffmpeg's `volumedetect` filter, in dBFS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessReport {
    pub max_volume_db: f64,
    pub mean_volume_db: f64,
}

/// Result of decoding the whole stream to the null muxer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

/// Black intervals found by ffmpeg's `blackdetect` filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlackFrameReport {
    pub intervals: usize,
    pub black_duration: f64,
}

impl BlackFrameReport {
    /// Fraction of `duration` that is black, 0 when the duration is unknown.
    pub fn ratio(&self, duration: f64) -> f64 {
        if duration <= 0.0 {
            0.0
        } else {
            (self.black_duration / duration).min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIO_PROBE: &str = r#"{
        "streams": [{
            "index": 0,
            "codec_name": "pcm_s24le",
            "codec_type": "audio",
            "sample_rate": "48000",
            "channels": 2,
            "bits_per_sample": 24,
            "r_frame_rate": "0/0",
            "bit_rate": "2304000"
        }],
        "format": {
            "format_name": "wav",
            "duration": "215.360000",
            "size": "62023724",
            "bit_rate": "2304003"
        }
    }"#;

    const VIDEO_PROBE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "profile": "High",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "bit_rate": "8000000"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "profile": "LC",
                "codec_type": "audio",
                "sample_rate": "44100",
                "channels": 2,
                "bit_rate": "320000"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "184.184000"
        }
    }"#;

    #[test]
    fn test_audio_report_to_technical() {
        let report = ProbeReport::from_json(AUDIO_PROBE.as_bytes()).unwrap();
        let technical = report.to_audio_technical(AudioFormat::Wav);
        assert_eq!(technical.codec.as_deref(), Some("pcm_s24le"));
        assert_eq!(technical.sample_rate, 48_000);
        assert_eq!(technical.channels, 2);
        assert_eq!(technical.bitrate, 2_304_003);
        assert_eq!(technical.bit_depth, Some(24));
        assert!((technical.duration - 215.36).abs() < 1e-9);
        assert!(report.video_stream().is_none());
    }

    #[test]
    fn test_video_report_to_technical() {
        let report = ProbeReport::from_json(VIDEO_PROBE.as_bytes()).unwrap();
        let technical = report.to_video_technical(VideoFormat::Mp4);
        assert_eq!((technical.width, technical.height), (1920, 1080));
        assert!((technical.frame_rate - 29.97).abs() < 0.01);
        // No container bitrate: falls back to the video stream.
        assert_eq!(technical.bitrate, 8_000_000);
        assert_eq!(technical.video_codec.as_deref(), Some("h264"));
        assert_eq!(technical.audio_codec.as_deref(), Some("aac"));
        assert_eq!(technical.streams.len(), 2);
        assert_eq!(technical.streams[0].profile.as_deref(), Some("High"));
        assert_eq!(technical.streams[1].sample_rate, Some(44_100));
    }

    #[test]
    fn test_missing_sections_default() {
        let report = ProbeReport::from_json(b"{}").unwrap();
        assert!(report.streams.is_empty());
        assert_eq!(report.duration(), None);
        let technical = report.to_audio_technical(AudioFormat::Mp3);
        assert_eq!(technical.sample_rate, 0);
        assert_eq!(technical.codec, None);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_black_ratio() {
        let report = BlackFrameReport {
            intervals: 2,
            black_duration: 5.0,
        };
        assert!((report.ratio(20.0) - 0.25).abs() < 1e-9);
        assert_eq!(report.ratio(0.0), 0.0);
        assert_eq!(report.ratio(2.0), 1.0);
    }
}
