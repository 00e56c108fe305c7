use cadence_core::models::{TechnicalMetadata, VideoFormat};
use cadence_core::VideoThresholds;
use cadence_processing::{BlackFrameReport, MediaInspector, ProbeReport};
use std::path::Path;

use super::{CheckResult, ValidationOutcome};

pub(super) async fn validate(
    inspector: &dyn MediaInspector,
    path: &Path,
    format: VideoFormat,
    thresholds: &VideoThresholds,
) -> ValidationOutcome {
    let probe = inspector.probe(path).await.map_err(|e| e.to_string());
    let black = match &probe {
        Ok(report) if report.video_stream().is_some() => {
            inspector.black_frames(path).await.map_err(|e| e.to_string())
        }
        _ => Err("no video stream".to_string()),
    };
    evaluate(probe, black, format, thresholds)
}

pub(super) fn evaluate(
    probe: Result<ProbeReport, String>,
    black: Result<BlackFrameReport, String>,
    format: VideoFormat,
    t: &VideoThresholds,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    const CHECKS: [&str; 6] = [
        "video_stream",
        "resolution",
        "frame_rate",
        "bitrate",
        "codec",
        "black_frames",
    ];

    let probe = match probe {
        Ok(probe) if probe.video_stream().is_some() => probe,
        Ok(_) => {
            for name in CHECKS {
                outcome.record(name, CheckResult::unavailable("no video stream"));
            }
            return outcome;
        }
        Err(e) => {
            let reason = format!("probe failed: {}", e);
            for name in CHECKS {
                outcome.record(name, CheckResult::unavailable(&reason));
            }
            return outcome;
        }
    };

    let technical = probe.to_video_technical(format);
    let codec = technical.video_codec.clone().unwrap_or_default();

    outcome.record(
        "video_stream",
        CheckResult::pass(
            format!("{} video, {} streams", codec, technical.streams.len()),
            technical.streams.len(),
        ),
    );

    let (width, height) = (technical.width.max(0) as u32, technical.height.max(0) as u32);
    outcome.record(
        "resolution",
        CheckResult::check(
            width >= t.min_width && height >= t.min_height,
            format!(
                "{}x{} (minimum {}x{})",
                width, height, t.min_width, t.min_height
            ),
            [width, height],
        ),
    );

    outcome.record(
        "frame_rate",
        CheckResult::check(
            technical.frame_rate >= t.min_frame_rate,
            format!(
                "{:.3} fps (minimum {:.3})",
                technical.frame_rate, t.min_frame_rate
            ),
            technical.frame_rate,
        ),
    );

    outcome.record(
        "bitrate",
        CheckResult::check(
            technical.bitrate.max(0) as u64 >= t.min_bitrate,
            format!(
                "{} kb/s (minimum {} kb/s)",
                technical.bitrate / 1000,
                t.min_bitrate / 1000
            ),
            technical.bitrate,
        ),
    );

    let accepted = t
        .allowed_codecs
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&codec));
    outcome.record(
        "codec",
        CheckResult::check(
            accepted,
            format!("{} (accepted: {})", codec, t.allowed_codecs.join(", ")),
            &codec,
        ),
    );

    match black {
        Ok(report) => {
            let ratio = report.ratio(technical.duration);
            outcome.record(
                "black_frames",
                CheckResult::check(
                    ratio <= t.max_black_ratio,
                    format!(
                        "{:.1}s black in {} intervals ({:.0}% of {:.1}s)",
                        report.black_duration,
                        report.intervals,
                        ratio * 100.0,
                        technical.duration
                    ),
                    ratio,
                ),
            );
        }
        Err(e) => outcome.record(
            "black_frames",
            CheckResult::unavailable(format!("black frame scan failed: {}", e)),
        ),
    }

    outcome.technical = Some(TechnicalMetadata::Video(technical));
    outcome
}
