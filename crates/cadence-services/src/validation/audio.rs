use cadence_core::models::{AudioFormat, TechnicalMetadata};
use cadence_core::AudioThresholds;
use cadence_processing::{DecodeReport, LoudnessReport, MediaInspector, ProbeReport};
use std::path::Path;

use super::{CheckResult, ValidationOutcome};

/// Raw inspection results; any of them may have failed.
pub(super) struct AudioEvidence {
    pub probe: Result<ProbeReport, String>,
    pub loudness: Result<LoudnessReport, String>,
    pub decode: Result<DecodeReport, String>,
}

pub(super) async fn validate(
    inspector: &dyn MediaInspector,
    path: &Path,
    format: AudioFormat,
    thresholds: &AudioThresholds,
) -> ValidationOutcome {
    let probe = inspector.probe(path).await.map_err(|e| e.to_string());
    let has_stream = matches!(&probe, Ok(report) if report.audio_stream().is_some());

    let evidence = if has_stream {
        AudioEvidence {
            probe,
            loudness: inspector.loudness(path).await.map_err(|e| e.to_string()),
            decode: inspector.decode_check(path).await.map_err(|e| e.to_string()),
        }
    } else {
        AudioEvidence {
            probe,
            loudness: Err("no audio stream".to_string()),
            decode: Err("no audio stream".to_string()),
        }
    };
    evaluate(evidence, format, thresholds)
}

pub(super) fn evaluate(
    evidence: AudioEvidence,
    format: AudioFormat,
    t: &AudioThresholds,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    let probe = match evidence.probe {
        Ok(probe) => probe,
        Err(e) => {
            let reason = format!("probe failed: {}", e);
            outcome.record("audio_stream", CheckResult::unavailable(&reason));
            for name in ["format", "channels", "bitrate", "loudness", "integrity"] {
                outcome.record(name, CheckResult::unavailable(&reason));
            }
            return outcome;
        }
    };

    let mut technical = probe.to_audio_technical(format);
    let codec = technical.codec.clone();

    match probe.audio_stream() {
        Some(_) => outcome.record(
            "audio_stream",
            CheckResult::pass(
                format!("{} stream", codec.as_deref().unwrap_or("unknown")),
                &codec,
            ),
        ),
        None => outcome.record("audio_stream", CheckResult::unavailable("no audio stream")),
    }

    let sample_rate = technical.sample_rate.max(0) as u32;
    outcome.record(
        "format",
        CheckResult::check(
            codec.is_some() && sample_rate >= t.min_sample_rate,
            format!(
                "{} at {} Hz (minimum {} Hz)",
                codec.as_deref().unwrap_or("unknown codec"),
                sample_rate,
                t.min_sample_rate
            ),
            sample_rate,
        ),
    );

    let channels = technical.channels.max(0) as u32;
    outcome.record(
        "channels",
        CheckResult::check(
            channels >= t.min_channels,
            format!("{} channels (minimum {})", channels, t.min_channels),
            channels,
        ),
    );

    let min_bitrate = t.min_bitrate_kbps as i64 * 1000;
    outcome.record(
        "bitrate",
        CheckResult::check(
            technical.bitrate >= min_bitrate,
            format!(
                "{} kb/s (minimum {} kb/s)",
                technical.bitrate / 1000,
                t.min_bitrate_kbps
            ),
            technical.bitrate,
        ),
    );

    match evidence.loudness {
        Ok(levels) => {
            technical.peak_db = Some(levels.max_volume_db);
            technical.mean_db = Some(levels.mean_volume_db);
            outcome.record(
                "loudness",
                CheckResult::check(
                    levels.max_volume_db <= t.max_peak_db && levels.mean_volume_db >= t.min_mean_db,
                    format!(
                        "peak {:.1} dB (at most {:.1}), mean {:.1} dB (at least {:.1})",
                        levels.max_volume_db, t.max_peak_db, levels.mean_volume_db, t.min_mean_db
                    ),
                    serde_json::json!({
                        "peakDb": levels.max_volume_db,
                        "meanDb": levels.mean_volume_db,
                    }),
                ),
            );
        }
        Err(e) => outcome.record(
            "loudness",
            CheckResult::unavailable(format!("loudness sweep failed: {}", e)),
        ),
    }

    match evidence.decode {
        Ok(report) if report.ok => {
            outcome.record("integrity", CheckResult::pass("decoded cleanly", 0))
        }
        Ok(report) => outcome.record(
            "integrity",
            CheckResult::fail(
                format!("{} decoder errors", report.errors.len()),
                &report.errors,
            ),
        ),
        Err(e) => outcome.record(
            "integrity",
            CheckResult::unavailable(format!("decode check failed: {}", e)),
        ),
    }

    outcome.technical = Some(TechnicalMetadata::Audio(technical));
    outcome
}
