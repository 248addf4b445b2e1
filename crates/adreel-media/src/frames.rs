//! Still-frame extraction.

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegInput};
use crate::error::{MediaError, MediaResult};
use crate::FfmpegRunner;

/// Default sampling rate for dense end-of-clip extraction.
pub const DEFAULT_SAMPLE_FPS: u32 = 30;

/// Extract a single frame at `timestamp` seconds into `output` (png/jpg).
pub async fn extract_frame(
    video: impl AsRef<Path>,
    timestamp: f64,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let video = video.as_ref();
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    let cmd = FfmpegCommand::new(output.as_ref())
        .input(FfmpegInput::file_seeked(video, timestamp.max(0.0)))
        .single_frame();

    FfmpegRunner::new().run(&cmd).await
}

/// Extract the first frame of a video.
pub async fn extract_first_frame(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    extract_frame(video, 0.0, output).await
}

/// Extract every frame in the trailing `window_secs` of a clip at
/// `sample_fps`, writing numbered images into `out_dir`.
///
/// Returns the extracted frame paths in presentation order. The sampling
/// interval for converting a frame index back to a timestamp is
/// `1.0 / sample_fps`.
pub async fn extract_trailing_frames(
    video: impl AsRef<Path>,
    duration: f64,
    window_secs: f64,
    sample_fps: u32,
    out_dir: impl AsRef<Path>,
) -> MediaResult<Vec<PathBuf>> {
    let video = video.as_ref();
    let out_dir = out_dir.as_ref();
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }

    tokio::fs::create_dir_all(out_dir).await?;
    let start = (duration - window_secs).max(0.0);
    let pattern = out_dir.join("frame_%04d.png");

    let cmd = FfmpegCommand::new(&pattern)
        .input(FfmpegInput::file_seeked(video, start))
        .video_filter(format!("fps={}", sample_fps));

    FfmpegRunner::new().run(&cmd).await?;

    let mut frames: Vec<PathBuf> = std::fs::read_dir(out_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("frame_") && n.ends_with(".png"))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();

    if frames.is_empty() {
        return Err(MediaError::NoFramesExtracted(format!(
            "no frames in last {:.2}s of {}",
            window_secs,
            video.display()
        )));
    }

    Ok(frames)
}

/// Trim a video to `[0, timestamp)`, re-encoding for a frame-accurate cut.
pub async fn trim_video(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timestamp: f64,
) -> MediaResult<()> {
    let input = input.as_ref();
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    if timestamp <= 0.0 {
        return Err(MediaError::invalid_timeline(format!(
            "trim timestamp must be positive, got {:.3}",
            timestamp
        )));
    }

    let cmd = FfmpegCommand::simple(input, output.as_ref())
        .duration(timestamp)
        .output_args(["-c:v", "libx264", "-preset", "fast", "-crf", "18"])
        .output_args(["-c:a", "aac"]);

    FfmpegRunner::new().run(&cmd).await
}
