//! Data models for the file storage engine

mod asset;
mod audio;
mod chunk;
mod file;
mod image;
mod video;

pub use asset::*;
pub use audio::*;
pub use chunk::*;
pub use file::*;
pub use image::*;
pub use video::*;
