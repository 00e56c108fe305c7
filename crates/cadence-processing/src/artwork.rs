//! Decoding and pixel statistics for image assets.

use anyhow::{Context, Result};
use cadence_core::models::{ImageFormat, ImageTechnical};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;

/// Longest edge the statistics are computed on.
const STATS_MAX_EDGE: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInspection {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub has_alpha: bool,
    pub channels: u8,
    /// Mean luma, 0-255.
    pub brightness: f64,
    /// Standard deviation of luma, 0-255.
    pub contrast: f64,
}

impl ImageInspection {
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    /// Technical fields for the record; `fallback` is used when the decoder could not name the format.
    pub fn to_technical(&self, fallback: ImageFormat) -> ImageTechnical {
        ImageTechnical {
            format: if self.format == ImageFormat::Unknown {
                fallback
            } else {
                self.format
            },
            width: self.width as i32,
            height: self.height as i32,
            color_space: Some(self.color_space.clone()),
            has_alpha: self.has_alpha,
            channels: self.channels as i32,
        }
    }
}

/// Decode `data` and measure it.
pub fn inspect_image(data: &[u8]) -> Result<ImageInspection> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Failed to read image header")?;
    let format = reader.format().map(map_format).unwrap_or(ImageFormat::Unknown);
    let img = reader.decode().context("Failed to decode image")?;

    let (width, height) = img.dimensions();
    let color = img.color();
    let (brightness, contrast) = luma_statistics(&img);

    Ok(ImageInspection {
        format,
        width,
        height,
        color_space: color_space_name(color).to_string(),
        has_alpha: color.has_alpha(),
        channels: color.channel_count(),
        brightness,
        contrast,
    })
}

fn map_format(format: image::ImageFormat) -> ImageFormat {
    match format {
        image::ImageFormat::Jpeg => ImageFormat::Jpeg,
        image::ImageFormat::Png => ImageFormat::Png,
        image::ImageFormat::WebP => ImageFormat::Webp,
        image::ImageFormat::Gif => ImageFormat::Gif,
        image::ImageFormat::Tiff => ImageFormat::Tiff,
        _ => ImageFormat::Unknown,
    }
}

fn color_space_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => "gray",
        ColorType::Rgb32F | ColorType::Rgba32F => "linear-rgb",
        _ => "srgb",
    }
}

/// Mean and standard deviation of luma over a nearest-neighbour downscale.
fn luma_statistics(img: &DynamicImage) -> (f64, f64) {
    let (width, height) = img.dimensions();
    let luma = if width.max(height) > STATS_MAX_EDGE {
        img.resize(STATS_MAX_EDGE, STATS_MAX_EDGE, FilterType::Nearest)
            .to_luma8()
    } else {
        img.to_luma8()
    };

    let pixels = luma.as_raw();
    if pixels.is_empty() {
        return (0.0, 0.0);
    }
    let count = pixels.len() as f64;
    let mean = pixels.iter().map(|p| *p as f64).sum::<f64>() / count;
    let variance = pixels
        .iter()
        .map(|p| {
            let d = *p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn encode(img: DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_uniform_gray_has_no_contrast() {
        let img = ImageBuffer::from_pixel(64, 64, Rgb([128u8, 128, 128]));
        let data = encode(DynamicImage::ImageRgb8(img), image::ImageFormat::Png);

        let inspection = inspect_image(&data).unwrap();
        assert_eq!(inspection.format, ImageFormat::Png);
        assert_eq!((inspection.width, inspection.height), (64, 64));
        assert_eq!(inspection.color_space, "srgb");
        assert!(!inspection.has_alpha);
        assert_eq!(inspection.channels, 3);
        assert!((inspection.brightness - 128.0).abs() < 1.0);
        assert!(inspection.contrast < 0.5);
    }

    #[test]
    fn test_checkerboard_contrast() {
        let img = ImageBuffer::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0u8, 0, 0])
            } else {
                Rgb([255u8, 255, 255])
            }
        });
        let data = encode(DynamicImage::ImageRgb8(img), image::ImageFormat::Png);

        let inspection = inspect_image(&data).unwrap();
        assert!((inspection.brightness - 127.5).abs() < 1.0);
        assert!((inspection.contrast - 127.5).abs() < 1.0);
    }

    #[test]
    fn test_alpha_and_aspect_ratio() {
        let img = ImageBuffer::from_pixel(40, 20, Rgba([10u8, 20, 30, 200]));
        let data = encode(DynamicImage::ImageRgba8(img), image::ImageFormat::Png);

        let inspection = inspect_image(&data).unwrap();
        assert!(inspection.has_alpha);
        assert_eq!(inspection.channels, 4);
        assert!((inspection.aspect_ratio() - 2.0).abs() < 1e-9);

        let technical = inspection.to_technical(ImageFormat::Unknown);
        assert_eq!(technical.format, ImageFormat::Png);
        assert_eq!(technical.width, 40);
        assert_eq!(technical.color_space.as_deref(), Some("srgb"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(inspect_image(b"definitely not an image").is_err());
    }
}
