//! Segment generation worker.
//!
//! Orchestrates per-segment video generation against external model
//! providers, synthesizes narration audio, and offers a continuity
//! re-cut for rough segment boundaries.

pub mod assembly;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod narration;
pub mod orchestrator;
pub mod recut;

pub use assembly::{Compositor, FfmpegCompositor};
pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use narration::extract_narration;
pub use orchestrator::run_generation_job;
pub use recut::{recut_segment, RecutOutcome};
