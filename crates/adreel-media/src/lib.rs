//! FFmpeg composition and continuity analysis.
//!
//! This crate provides:
//! - Type-safe multi-input FFmpeg command building and execution
//! - FFprobe-based media inspection
//! - Still-frame extraction and video trimming
//! - Frame similarity scoring (SSIM with a PSNR fallback)
//! - Filter-graph composition of an ordered clip timeline
//! - Stitch-point optimization between adjacent clips

pub mod command;
pub mod compose;
pub mod error;
pub mod frames;
pub mod probe;
pub mod similarity;
pub mod stitch;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use compose::{compile, compose, CompositionPlan, OUTPUT_FPS};
pub use error::{MediaError, MediaResult};
pub use frames::{
    extract_first_frame, extract_frame, extract_trailing_frames, trim_video, DEFAULT_SAMPLE_FPS,
};
pub use probe::{probe_video, VideoInfo};
pub use similarity::{score_frames, score_images};
pub use stitch::{
    candidate_timestamps, find_best_cut, optimize_transitions, CutPoint, DEFAULT_SAMPLE_COUNT,
    DEFAULT_SAMPLE_WINDOW_SECS,
};
