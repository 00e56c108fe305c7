use cadence_core::models::{ImageFormat, TechnicalMetadata};
use cadence_core::ImageThresholds;
use cadence_processing::{inspect_image, ImageInspection};

use super::{CheckResult, ValidationOutcome};

/// Decoding is CPU bound and runs on the blocking pool.
pub(super) async fn validate(
    data: Vec<u8>,
    format: ImageFormat,
    thresholds: &ImageThresholds,
) -> ValidationOutcome {
    let inspection = match tokio::task::spawn_blocking(move || inspect_image(&data)).await {
        Ok(result) => result.map_err(|e| format!("{:#}", e)),
        Err(e) => Err(format!("image inspection task failed: {}", e)),
    };
    evaluate(inspection, format, thresholds)
}

pub(super) fn evaluate(
    inspection: Result<ImageInspection, String>,
    format: ImageFormat,
    t: &ImageThresholds,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    let image = match inspection {
        Ok(image) => image,
        Err(e) => {
            outcome.record("decode", CheckResult::unavailable(format!("decode failed: {}", e)));
            for name in ["dimensions", "aspect_ratio", "brightness", "contrast"] {
                outcome.record(name, CheckResult::unavailable("image could not be decoded"));
            }
            return outcome;
        }
    };

    outcome.record(
        "decode",
        CheckResult::pass(
            format!("{} {}", image.format.as_str(), image.color_space),
            &image.color_space,
        ),
    );

    let within = |d: u32| d >= t.min_dimension && d <= t.max_dimension;
    outcome.record(
        "dimensions",
        CheckResult::check(
            within(image.width) && within(image.height),
            format!(
                "{}x{} (each side {}-{})",
                image.width, image.height, t.min_dimension, t.max_dimension
            ),
            [image.width, image.height],
        ),
    );

    let ratio = image.aspect_ratio();
    outcome.record(
        "aspect_ratio",
        CheckResult::check(
            ratio >= t.min_aspect_ratio && ratio <= t.max_aspect_ratio,
            format!(
                "{:.3} (allowed {:.2}-{:.2})",
                ratio, t.min_aspect_ratio, t.max_aspect_ratio
            ),
            ratio,
        ),
    );

    outcome.record(
        "brightness",
        CheckResult::check(
            image.brightness >= t.min_brightness && image.brightness <= t.max_brightness,
            format!(
                "mean luma {:.1} (allowed {:.0}-{:.0})",
                image.brightness, t.min_brightness, t.max_brightness
            ),
            image.brightness,
        ),
    );

    outcome.record(
        "contrast",
        CheckResult::check(
            image.contrast >= t.min_contrast,
            format!("luma deviation {:.1} (minimum {:.1})", image.contrast, t.min_contrast),
            image.contrast,
        ),
    );

    outcome.technical = Some(TechnicalMetadata::Image(image.to_technical(format)));
    outcome
}
