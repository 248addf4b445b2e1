//! FFmpeg command builder and runner.
//!
//! Composition runs are multi-input (`-i` per clip plus voice/music
//! tracks), so the builder carries an ordered input list where each input
//! can have its own pre-`-i` arguments (seek, `-stream_loop`, lavfi).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// One `-i` input with its own preceding arguments.
#[derive(Debug, Clone)]
pub struct FfmpegInput {
    /// Arguments placed before this input's `-i`
    pub args: Vec<String>,
    /// Input specifier (file path or lavfi source)
    pub source: String,
}

impl FfmpegInput {
    /// Plain file input.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            args: Vec::new(),
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Input seeked to `seconds` before decoding.
    pub fn file_seeked(path: impl AsRef<Path>, seconds: f64) -> Self {
        Self {
            args: vec!["-ss".to_string(), format!("{:.3}", seconds)],
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// File input looped indefinitely (trimmed downstream by the graph).
    pub fn file_looped(path: impl AsRef<Path>) -> Self {
        Self {
            args: vec!["-stream_loop".to_string(), "-1".to_string()],
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Synthetic lavfi source (e.g. `anullsrc`).
    pub fn lavfi(expr: impl Into<String>) -> Self {
        Self {
            args: vec!["-f".to_string(), "lavfi".to_string()],
            source: expr.into(),
        }
    }

    /// Add an extra pre-`-i` argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Builder for FFmpeg invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Convenience: single file input to `output`.
    pub fn simple(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::new(output).input(FfmpegInput::file(input))
    }

    /// Append an input.
    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add an output argument (after all `-i`s).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set a filter complex graph.
    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(graph)
    }

    /// Set a simple video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Copy streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the full argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with an optional timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Kill the encode after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run a command to completion. On failure the captured stderr is
    /// surfaced verbatim in the error.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let wait = child.wait_with_output();

        let output = if let Some(timeout_secs) = self.timeout_secs {
            match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), wait).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds", timeout_secs);
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            wait.await?
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_args_in_input_order() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input(FfmpegInput::file("a.mp4"))
            .input(FfmpegInput::file_looped("music.mp3"))
            .filter_complex("[0:v]null[v]")
            .output_arg("-map")
            .output_arg("[v]");

        let args = cmd.build_args();
        let first_i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_i + 1], "a.mp4");

        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_pos + 1], "-1");
        assert_eq!(args[loop_pos + 2], "-i");
        assert_eq!(args[loop_pos + 3], "music.mp3");

        assert_eq!(*args.last().unwrap(), "out.mp4".to_string());
    }

    #[test]
    fn seeked_input_places_ss_before_i() {
        let cmd = FfmpegCommand::new("frame.png")
            .input(FfmpegInput::file_seeked("clip.mp4", 4.25))
            .single_frame();

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "4.250");
        assert_eq!(args[ss + 2], "-i");
        assert!(args.contains(&"-vframes".to_string()));
    }

    #[test]
    fn lavfi_input_sets_format() {
        let cmd = FfmpegCommand::new("out.wav")
            .input(FfmpegInput::lavfi("anullsrc=channel_layout=stereo:sample_rate=44100"));
        let args = cmd.build_args();
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "lavfi");
    }
}
