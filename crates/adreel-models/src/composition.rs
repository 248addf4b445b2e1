//! Composition-time types: clips on the output timeline, stitch
//! adjustments, and composition options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default canonical output resolution (9:16 portrait).
pub const DEFAULT_OUTPUT_WIDTH: u32 = 1080;
pub const DEFAULT_OUTPUT_HEIGHT: u32 = 1920;

/// Transition style between clips.
///
/// Accepted as an option for forward compatibility; the default
/// composition path performs direct concatenation (hard cuts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Cut,
    Fade,
    Dissolve,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Cut => "cut",
            Transition::Fade => "fade",
            Transition::Dissolve => "dissolve",
        }
    }
}

/// A per-word (or per-phrase) slice of a voice track, aligned to the
/// clip's local timeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TimingHint {
    /// Offset into the clip where this slice starts, seconds
    pub start: f64,
    /// Offset into the clip where this slice ends, seconds
    pub end: f64,
    /// Audio file holding this slice
    pub path: PathBuf,
}

/// A clip placed on the output timeline. Ephemeral: built per composition
/// run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Local video file for this clip
    pub local_path: PathBuf,

    /// Voice track used when the source carries no embedded audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_path: Option<PathBuf>,

    /// Timeline-relative start, seconds (not source-relative)
    pub start_time: f64,

    /// Timeline-relative end, seconds
    pub end_time: f64,

    /// Whether the source video carries an embedded audio stream
    #[serde(default)]
    pub has_audio: bool,

    /// Per-word timing hints splitting the voice track, when available
    #[serde(default)]
    pub timing_hints: Vec<TimingHint>,
}

impl Clip {
    /// Duration of the clip on the output timeline.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Immutable record of the cut decision made for one adjacent clip pair.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StitchAdjustment {
    /// Index of the preceding clip whose end was adjusted
    pub clip_index: usize,
    /// Timeline end before adjustment, seconds
    pub original_end_time: f64,
    /// Timeline end after adjustment, seconds
    pub adjusted_end_time: f64,
    /// Seconds trimmed off; never negative
    pub trimmed_seconds: f64,
    /// Similarity of the chosen cut frame to the next clip's first frame
    pub similarity: f64,
    /// Transition applied at this boundary
    pub transition_name: String,
}

/// Options controlling a single composition run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompositionOptions {
    /// Transition style (the default path hard-cuts regardless)
    #[serde(default)]
    pub transition: Transition,

    /// Background music volume, 0–100
    pub music_volume: u8,

    /// Where the encoded output lands
    pub output_path: PathBuf,

    /// Background music track, looped/trimmed to the timeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_music_path: Option<PathBuf>,

    /// Canonical output width
    pub output_width: u32,

    /// Canonical output height
    pub output_height: u32,
}

impl CompositionOptions {
    /// Options with defaults for the given output path.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            transition: Transition::default(),
            music_volume: 50,
            output_path: output_path.into(),
            background_music_path: None,
            output_width: DEFAULT_OUTPUT_WIDTH,
            output_height: DEFAULT_OUTPUT_HEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration() {
        let clip = Clip {
            local_path: PathBuf::from("/tmp/a.mp4"),
            voice_path: None,
            start_time: 2.5,
            end_time: 7.0,
            has_audio: true,
            timing_hints: Vec::new(),
        };
        assert!((clip.duration() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn default_options_are_portrait() {
        let opts = CompositionOptions::new("/tmp/out.mp4");
        assert_eq!(opts.output_width, 1080);
        assert_eq!(opts.output_height, 1920);
        assert_eq!(opts.transition, Transition::Cut);
    }
}
