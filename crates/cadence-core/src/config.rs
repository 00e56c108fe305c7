//! Configuration module
//!
//! Configuration is read once at process start from the environment (and an
//! optional `.env` file), validated, and then shared read-only for the life of
//! the process.

use std::env;
use std::str::FromStr;

use crate::models::FileKind;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const CHUNK_EXPIRY_HOURS: i64 = 24;
const MAX_CHUNK_COUNT: u32 = 10_000;
const SIGNED_URL_TTL_SECONDS: u64 = 3600;
const MAX_AUDIO_SIZE_MB: u64 = 500;
const MAX_IMAGE_SIZE_MB: u64 = 50;
const MAX_VIDEO_SIZE_MB: u64 = 4096;
const VALIDATION_MAX_CONCURRENCY: usize = 2;
const CLEANUP_INTERVAL_SECS: u64 = 3600;
const FINALIZE_GRACE_SECS: u64 = 3600;
const VALIDATION_STALE_AFTER_SECS: u64 = 3600;

/// Smallest part size an S3-compatible store accepts for non-final parts.
pub const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Boundary limits for one file kind.
#[derive(Clone, Debug)]
pub struct MediaLimits {
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub s3_endpoint: Option<String>,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub signed_url_ttl_secs: u64,
}

impl StorageConfig {
    /// Logical bucket name recorded on every file.
    pub fn bucket_name(&self) -> &str {
        match self.backend {
            StorageBackend::S3 => self.s3_bucket.as_deref().unwrap_or("cadence"),
            StorageBackend::Local => "local",
        }
    }
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub chunk_size_bytes: u64,
    pub chunk_expiry_hours: i64,
    pub max_chunk_count: u32,
    /// How long a session may sit in PROCESSING before the sweep treats its
    /// finalizer as dead.
    pub finalize_grace_secs: u64,
    pub audio: MediaLimits,
    pub image: MediaLimits,
    pub video: MediaLimits,
}

impl UploadConfig {
    pub fn limits_for(&self, kind: FileKind) -> &MediaLimits {
        match kind {
            FileKind::Audio => &self.audio,
            FileKind::Image => &self.image,
            FileKind::Video => &self.video,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioThresholds {
    pub min_sample_rate: u32,
    pub min_bitrate_kbps: u32,
    pub min_channels: u32,
    /// Peak level must not exceed this (dBFS); volumedetect reports a
    /// full-scale peak as 0.0.
    pub max_peak_db: f64,
    /// Mean level must stay at or above this (dBFS).
    pub min_mean_db: f64,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            min_sample_rate: 44_100,
            min_bitrate_kbps: 320,
            min_channels: 2,
            max_peak_db: 0.0,
            min_mean_db: -30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageThresholds {
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_contrast: f64,
}

impl Default for ImageThresholds {
    fn default() -> Self {
        Self {
            min_dimension: 1400,
            max_dimension: 6000,
            min_aspect_ratio: 0.95,
            max_aspect_ratio: 1.05,
            min_brightness: 10.0,
            max_brightness: 245.0,
            min_contrast: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoThresholds {
    pub min_width: u32,
    pub min_height: u32,
    pub min_frame_rate: f64,
    pub min_bitrate: u64,
    pub allowed_codecs: Vec<String>,
    pub max_black_ratio: f64,
}

impl Default for VideoThresholds {
    fn default() -> Self {
        Self {
            min_width: 1280,
            min_height: 720,
            min_frame_rate: 23.0,
            min_bitrate: 2_000_000,
            allowed_codecs: split_list("h264,hevc,prores,vp9,av1"),
            max_black_ratio: 0.5,
        }
    }
}

/// Distribution-readiness thresholds applied by the validation pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationThresholds {
    pub audio: AudioThresholds,
    pub image: ImageThresholds,
    pub video: VideoThresholds,
}

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub max_concurrency: usize,
    /// IN_PROGRESS runs older than this are considered abandoned at startup.
    pub stale_after_secs: u64,
    pub thresholds: ValidationThresholds,
}

/// Process-wide configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub validation: ValidationConfig,
    /// Interval of the expired-session sweep; 0 disables it.
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = non_empty(&lookup, "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let backend = match non_empty(&lookup, "STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        Ok(Self::assemble(&lookup, database_url, backend))
    }

    fn assemble<F>(lookup: &F, database_url: String, backend: StorageBackend) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_empty(lookup, name);

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage = StorageConfig {
            backend,
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            local_storage_path: var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| "./data/storage".to_string()),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000/files".to_string()),
            signed_url_ttl_secs: parse_or(var("SIGNED_URL_TTL_SECONDS"), SIGNED_URL_TTL_SECONDS),
        };

        let limits = |prefix: &str, max_mb: u64, extensions: &str, content_types: &str| {
            MediaLimits {
                max_file_size: parse_or(var(&format!("MAX_{}_SIZE_MB", prefix)), max_mb)
                    * 1024
                    * 1024,
                allowed_extensions: split_list(
                    &var(&format!("{}_ALLOWED_EXTENSIONS", prefix))
                        .unwrap_or_else(|| extensions.to_string()),
                ),
                allowed_content_types: split_list(
                    &var(&format!("{}_ALLOWED_CONTENT_TYPES", prefix))
                        .unwrap_or_else(|| content_types.to_string()),
                ),
            }
        };

        let upload = UploadConfig {
            chunk_size_bytes: parse_or(var("CHUNK_SIZE_BYTES"), CHUNK_SIZE_BYTES),
            chunk_expiry_hours: parse_or(var("CHUNK_EXPIRY_HOURS"), CHUNK_EXPIRY_HOURS),
            max_chunk_count: parse_or(var("MAX_CHUNK_COUNT"), MAX_CHUNK_COUNT),
            finalize_grace_secs: parse_or(var("FINALIZE_GRACE_SECS"), FINALIZE_GRACE_SECS),
            audio: limits(
                "AUDIO",
                MAX_AUDIO_SIZE_MB,
                "wav,flac,mp3,aac,m4a,ogg,aif,aiff",
                "audio/wav,audio/x-wav,audio/wave,audio/flac,audio/x-flac,audio/mpeg,audio/mp3,\
                 audio/aac,audio/mp4,audio/x-m4a,audio/ogg,audio/aiff,audio/x-aiff",
            ),
            image: limits(
                "IMAGE",
                MAX_IMAGE_SIZE_MB,
                "jpg,jpeg,png,webp,gif,tif,tiff",
                "image/jpeg,image/png,image/webp,image/gif,image/tiff",
            ),
            video: limits(
                "VIDEO",
                MAX_VIDEO_SIZE_MB,
                "mp4,mov,m4v,webm,mkv",
                "video/mp4,video/quicktime,video/x-m4v,video/webm,video/x-matroska",
            ),
        };

        let audio_defaults = AudioThresholds::default();
        let image_defaults = ImageThresholds::default();
        let video_defaults = VideoThresholds::default();

        let thresholds = ValidationThresholds {
            audio: AudioThresholds {
                min_sample_rate: parse_or(
                    var("AUDIO_MIN_SAMPLE_RATE"),
                    audio_defaults.min_sample_rate,
                ),
                min_bitrate_kbps: parse_or(
                    var("AUDIO_MIN_BITRATE_KBPS"),
                    audio_defaults.min_bitrate_kbps,
                ),
                min_channels: parse_or(var("AUDIO_MIN_CHANNELS"), audio_defaults.min_channels),
                max_peak_db: parse_or(var("AUDIO_MAX_PEAK_DB"), audio_defaults.max_peak_db),
                min_mean_db: parse_or(var("AUDIO_MIN_MEAN_DB"), audio_defaults.min_mean_db),
            },
            image: ImageThresholds {
                min_dimension: parse_or(var("IMAGE_MIN_DIMENSION"), image_defaults.min_dimension),
                max_dimension: parse_or(var("IMAGE_MAX_DIMENSION"), image_defaults.max_dimension),
                min_aspect_ratio: parse_or(
                    var("IMAGE_MIN_ASPECT_RATIO"),
                    image_defaults.min_aspect_ratio,
                ),
                max_aspect_ratio: parse_or(
                    var("IMAGE_MAX_ASPECT_RATIO"),
                    image_defaults.max_aspect_ratio,
                ),
                min_brightness: parse_or(
                    var("IMAGE_MIN_BRIGHTNESS"),
                    image_defaults.min_brightness,
                ),
                max_brightness: parse_or(
                    var("IMAGE_MAX_BRIGHTNESS"),
                    image_defaults.max_brightness,
                ),
                min_contrast: parse_or(var("IMAGE_MIN_CONTRAST"), image_defaults.min_contrast),
            },
            video: VideoThresholds {
                min_width: parse_or(var("VIDEO_MIN_WIDTH"), video_defaults.min_width),
                min_height: parse_or(var("VIDEO_MIN_HEIGHT"), video_defaults.min_height),
                min_frame_rate: parse_or(
                    var("VIDEO_MIN_FRAME_RATE"),
                    video_defaults.min_frame_rate,
                ),
                min_bitrate: parse_or(var("VIDEO_MIN_BITRATE"), video_defaults.min_bitrate),
                allowed_codecs: var("VIDEO_ALLOWED_CODECS")
                    .map(|s| split_list(&s))
                    .unwrap_or(video_defaults.allowed_codecs),
                max_black_ratio: parse_or(
                    var("VIDEO_MAX_BLACK_RATIO"),
                    video_defaults.max_black_ratio,
                ),
            },
        };

        Config {
            environment,
            server_port: parse_or(var("SERVER_PORT"), SERVER_PORT),
            database_url,
            db_max_connections: parse_or(var("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(var("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
            storage,
            upload,
            validation: ValidationConfig {
                ffprobe_path: var("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
                ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
                max_concurrency: parse_or(
                    var("VALIDATION_MAX_CONCURRENCY"),
                    VALIDATION_MAX_CONCURRENCY,
                ),
                stale_after_secs: parse_or(
                    var("VALIDATION_STALE_AFTER_SECS"),
                    VALIDATION_STALE_AFTER_SECS,
                ),
                thresholds,
            },
            cleanup_interval_secs: parse_or(var("CLEANUP_INTERVAL_SECS"), CLEANUP_INTERVAL_SECS),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.uses_memory_database()
            && !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string or memory://"
            ));
        }

        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than zero"));
        }
        if self.upload.max_chunk_count == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNK_COUNT must be greater than zero"));
        }
        if self.upload.chunk_expiry_hours <= 0 {
            return Err(anyhow::anyhow!("CHUNK_EXPIRY_HOURS must be positive"));
        }
        if self.validation.max_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "VALIDATION_MAX_CONCURRENCY must be greater than zero"
            ));
        }

        let image = &self.validation.thresholds.image;
        if image.min_dimension > image.max_dimension {
            return Err(anyhow::anyhow!(
                "IMAGE_MIN_DIMENSION must not exceed IMAGE_MAX_DIMENSION"
            ));
        }
        if image.min_aspect_ratio > image.max_aspect_ratio {
            return Err(anyhow::anyhow!(
                "IMAGE_MIN_ASPECT_RATIO must not exceed IMAGE_MAX_ASPECT_RATIO"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
                if self.upload.chunk_size_bytes < S3_MIN_PART_SIZE {
                    return Err(anyhow::anyhow!(
                        "CHUNK_SIZE_BYTES must be at least {} bytes with the S3 backend",
                        S3_MIN_PART_SIZE
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.trim().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// `memory://` selects the in-memory repositories.
    pub fn uses_memory_database(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

impl Default for Config {
    fn default() -> Self {
        let empty = |_: &str| -> Option<String> { None };
        Self::assemble(&empty, "memory://".to_string(), StorageBackend::Local)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.uses_memory_database());
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.upload.chunk_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload.chunk_expiry_hours, 24);
        assert_eq!(config.upload.finalize_grace_secs, 3600);
        assert_eq!(config.validation.stale_after_secs, 3600);
        assert_eq!(config.upload.audio.max_file_size, 500 * 1024 * 1024);
        assert_eq!(config.validation.thresholds, ValidationThresholds::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_url_required() {
        assert!(config_from(&[]).is_err());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/cadence"),
            ("CHUNK_SIZE_BYTES", "1048576"),
            ("AUDIO_MIN_SAMPLE_RATE", "48000"),
            ("VIDEO_ALLOWED_CODECS", "H264, ProRes"),
            ("IMAGE_ALLOWED_EXTENSIONS", "png"),
            ("FINALIZE_GRACE_SECS", "600"),
        ])
        .unwrap();
        assert_eq!(config.upload.finalize_grace_secs, 600);
        assert_eq!(config.upload.chunk_size_bytes, 1_048_576);
        assert_eq!(config.validation.thresholds.audio.min_sample_rate, 48_000);
        assert_eq!(
            config.validation.thresholds.video.allowed_codecs,
            vec!["h264".to_string(), "prores".to_string()]
        );
        assert_eq!(config.upload.image.allowed_extensions, vec!["png"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = config_from(&[("DATABASE_URL", "memory://"), ("MAX_CHUNK_COUNT", "lots")])
            .unwrap();
        assert_eq!(config.upload.max_chunk_count, MAX_CHUNK_COUNT);
    }

    #[test]
    fn test_s3_requires_bucket_and_large_parts() {
        let config = config_from(&[
            ("DATABASE_URL", "memory://"),
            ("STORAGE_BACKEND", "s3"),
            ("S3_REGION", "eu-west-1"),
        ])
        .unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[
            ("DATABASE_URL", "memory://"),
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "masters"),
            ("AWS_REGION", "eu-west-1"),
            ("CHUNK_SIZE_BYTES", "1024"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let config = config_from(&[("DATABASE_URL", "mysql://localhost/db")]).unwrap();
        assert!(config.validate().is_err());
    }
}
