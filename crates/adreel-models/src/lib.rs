//! Shared data models for the AdReel composition engine.
//!
//! This crate defines the domain types shared by every other crate:
//! generation jobs and their per-segment assets, storyboards, and the
//! ephemeral composition-time types (clips, stitch adjustments, options).

pub mod composition;
pub mod job;
pub mod storyboard;

pub use composition::{
    Clip, CompositionOptions, StitchAdjustment, TimingHint, Transition, DEFAULT_OUTPUT_HEIGHT,
    DEFAULT_OUTPUT_WIDTH,
};
pub use job::{
    Asset, AssetMetadata, AssetStatus, GenerationJob, JobId, JobStatus, JobStatusSnapshot,
    SegmentSnapshot,
};
pub use storyboard::{StorySegment, Storyboard, StoryboardId};
