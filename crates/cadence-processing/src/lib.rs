//! Cadence Processing
//!
//! Media inspection used by the upload boundary and the validation pipeline:
//! allow-list checks on incoming files, ffprobe/ffmpeg probing for audio and
//! video, and pixel statistics for artwork.

pub mod ffmpeg;
#[cfg(feature = "image")]
pub mod artwork;
pub mod metadata;
pub mod validator;

pub use ffmpeg::{FfmpegInspector, MediaInspector};
#[cfg(feature = "image")]
pub use artwork::{inspect_image, ImageInspection};
pub use metadata::{
    BlackFrameReport, DecodeReport, LoudnessReport, ProbeFormat, ProbeReport, ProbeStream,
};
pub use validator::{MediaValidator, ValidationError};
