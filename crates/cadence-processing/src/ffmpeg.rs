//! ffprobe/ffmpeg backed inspection of audio and video files.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

use crate::metadata::{BlackFrameReport, DecodeReport, LoudnessReport, ProbeReport};

/// Decoder messages kept in a [`DecodeReport`].
const MAX_DECODE_ERRORS: usize = 20;

/// Inspection primitives used by the validation pipeline.
///
/// Every method reads a file that is already on local disk.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Container and stream descriptors.
    async fn probe(&self, path: &Path) -> Result<ProbeReport>;

    /// Peak and mean level of the first audio stream.
    async fn loudness(&self, path: &Path) -> Result<LoudnessReport>;

    /// Decode every frame and report decoder errors.
    async fn decode_check(&self, path: &Path) -> Result<DecodeReport>;

    /// Black intervals in the first video stream.
    async fn black_frames(&self, path: &Path) -> Result<BlackFrameReport>;
}

pub struct FfmpegInspector {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfmpegInspector {
    pub fn new(ffprobe_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Result<Self> {
        let ffprobe_path = ffprobe_path.into();
        let ffmpeg_path = ffmpeg_path.into();
        for binary in [&ffprobe_path, &ffmpeg_path] {
            if binary.is_empty()
                || !binary.chars().all(|c| {
                    c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\')
                })
            {
                return Err(anyhow!("Invalid binary path: {}", binary));
            }
        }
        Ok(Self {
            ffprobe_path,
            ffmpeg_path,
        })
    }

    async fn run(&self, program: &str, args: &[&str], input: &Path) -> Result<Output> {
        let input = checked_input(input)?;
        let start = std::time::Instant::now();
        let mut command = Command::new(program);
        for arg in args {
            if *arg == INPUT {
                command.arg(&input);
            } else {
                command.arg(arg);
            }
        }
        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", program))?;
        tracing::debug!(
            program,
            exit_code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Inspection command finished"
        );
        Ok(output)
    }
}

/// Placeholder marking where the input path goes in an argument list.
const INPUT: &str = "{input}";

fn checked_input(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Input file not accessible: {}", path.display()))?;
    if !canonical.is_file() {
        return Err(anyhow!("Input is not a file: {}", canonical.display()));
    }
    Ok(canonical)
}

#[async_trait]
impl MediaInspector for FfmpegInspector {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        let output = self
            .run(
                &self.ffprobe_path,
                &[
                    "-v",
                    "error",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                    INPUT,
                ],
                path,
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(stderr = %stderr, "ffprobe failed");
            return Err(anyhow!("ffprobe failed: {}", stderr.trim()));
        }

        ProbeReport::from_json(&output.stdout).context("Failed to parse ffprobe output")
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "volumedetect"
    ))]
    async fn loudness(&self, path: &Path) -> Result<LoudnessReport> {
        let output = self
            .run(
                &self.ffmpeg_path,
                &[
                    "-hide_banner",
                    "-nostats",
                    "-i",
                    INPUT,
                    "-map",
                    "0:a:0",
                    "-af",
                    "volumedetect",
                    "-f",
                    "null",
                    "-",
                ],
                path,
            )
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(anyhow!("ffmpeg volumedetect failed: {}", last_line(&stderr)));
        }
        parse_volumedetect(&stderr).ok_or_else(|| anyhow!("volumedetect produced no levels"))
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "decode"
    ))]
    async fn decode_check(&self, path: &Path) -> Result<DecodeReport> {
        let output = self
            .run(
                &self.ffmpeg_path,
                &["-v", "error", "-nostats", "-i", INPUT, "-f", "null", "-"],
                path,
            )
            .await?;

        Ok(parse_decode_output(
            output.status.success(),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "blackdetect"
    ))]
    async fn black_frames(&self, path: &Path) -> Result<BlackFrameReport> {
        let output = self
            .run(
                &self.ffmpeg_path,
                &[
                    "-hide_banner",
                    "-nostats",
                    "-i",
                    INPUT,
                    "-map",
                    "0:v:0",
                    "-vf",
                    "blackdetect=d=0.5:pix_th=0.10",
                    "-an",
                    "-f",
                    "null",
                    "-",
                ],
                path,
            )
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(anyhow!("ffmpeg blackdetect failed: {}", last_line(&stderr)));
        }
        Ok(parse_blackdetect(&stderr))
    }
}

fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}

/// Levels from `[Parsed_volumedetect_0 @ ..] max_volume: -0.5 dB` lines.
pub fn parse_volumedetect(stderr: &str) -> Option<LoudnessReport> {
    let level = |name: &str| {
        stderr.lines().find_map(|line| {
            let (_, rest) = line.split_once(name)?;
            let value = rest.trim_start_matches(':').trim().trim_end_matches("dB");
            value.trim().parse::<f64>().ok()
        })
    };
    Some(LoudnessReport {
        max_volume_db: level("max_volume")?,
        mean_volume_db: level("mean_volume")?,
    })
}

/// Sum of `black_duration:` values across `blackdetect` lines.
pub fn parse_blackdetect(stderr: &str) -> BlackFrameReport {
    let mut report = BlackFrameReport::default();
    for line in stderr.lines().filter(|l| l.contains("blackdetect")) {
        let duration = line.split_whitespace().find_map(|token| {
            token
                .strip_prefix("black_duration:")
                .and_then(|v| v.parse::<f64>().ok())
        });
        if let Some(duration) = duration {
            report.intervals += 1;
            report.black_duration += duration;
        }
    }
    report
}

/// With `-v error` any stderr line is a decoder complaint.
pub fn parse_decode_output(success: bool, stderr: &str) -> DecodeReport {
    let errors: Vec<String> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_DECODE_ERRORS)
        .map(str::to_string)
        .collect();
    DecodeReport {
        ok: success && errors.is_empty(),
        errors,
    }
}
