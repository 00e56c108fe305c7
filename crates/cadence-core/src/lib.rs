//! Cadence Core Library
//!
//! Domain models, error taxonomy, configuration and input validation shared by
//! every cadence crate. Nothing in here performs I/O beyond reading the
//! environment at startup.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{
    AudioThresholds, Config, ImageThresholds, MediaLimits, StorageConfig, UploadConfig,
    ValidationConfig, ValidationThresholds, VideoThresholds,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
// Storage, StorageError and StorageResult live in cadence-storage.
