//! Storyboard definitions: the creative input a job generates media for.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a storyboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct StoryboardId(pub String);

impl StoryboardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StoryboardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoryboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One narrative beat (hook/body/cta) of the ad.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorySegment {
    /// 0-based position within the storyboard
    pub segment_id: u32,

    /// Visual prompt handed to the video generation provider
    pub prompt: String,

    /// Target clip duration in seconds
    pub duration_secs: f64,

    /// Mixed free-text annotation: narration plus production notes.
    /// Narration is extracted from this field by a conservative parser.
    #[serde(default)]
    pub annotation: String,

    /// Image the clip should open on, when continuity with the previous
    /// segment is wanted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,

    /// Image the clip should close on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,

    /// Voice to synthesize narration with; falls back to the worker default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// An ordered set of segments making up one ad.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Storyboard {
    pub id: StoryboardId,

    /// Segments in narrative order; `segment_id` is contiguous from 0
    pub segments: Vec<StorySegment>,

    /// Optional background music for the final composition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,
}

impl Storyboard {
    /// Look up a segment by id.
    pub fn segment(&self, segment_id: u32) -> Option<&StorySegment> {
        self.segments.iter().find(|s| s.segment_id == segment_id)
    }

    /// Total planned duration across all segments.
    pub fn total_duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_lookup_and_total_duration() {
        let board = Storyboard {
            id: StoryboardId::new(),
            segments: vec![
                StorySegment {
                    segment_id: 0,
                    prompt: "opening hook".into(),
                    duration_secs: 5.0,
                    annotation: String::new(),
                    first_frame_url: None,
                    last_frame_url: None,
                    voice: None,
                },
                StorySegment {
                    segment_id: 1,
                    prompt: "product shot".into(),
                    duration_secs: 8.0,
                    annotation: String::new(),
                    first_frame_url: None,
                    last_frame_url: None,
                    voice: None,
                },
            ],
            music_url: None,
        };

        assert!(board.segment(1).is_some());
        assert!(board.segment(7).is_none());
        assert!((board.total_duration_secs() - 13.0).abs() < f64::EPSILON);
    }
}
