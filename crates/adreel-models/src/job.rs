//! Generation job and per-segment asset definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::storyboard::StoryboardId;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate job status. One-way: `Processing` → `Completed` | `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// At least one segment is still in flight and none has failed
    #[default]
    Processing,
    /// Every segment completed
    Completed,
    /// At least one segment failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Per-segment asset status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Not yet launched
    #[default]
    Pending,
    /// Generation in flight
    Processing,
    /// Media generated and persisted
    Completed,
    /// Generation failed terminally
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::Processing => "processing",
            AssetStatus::Completed => "completed",
            AssetStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Completed | AssetStatus::Failed)
    }
}

/// Provider bookkeeping and continuity metadata attached to an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AssetMetadata {
    /// Provider prediction id for the video generation request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,

    /// When generation was submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the asset reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Whether the single moderation-flag retry was used
    #[serde(default)]
    pub retry_attempted: bool,

    /// First frame of this segment, when known (used by the re-cut service)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,

    /// Re-cut output: trimmed asset URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trimmed_video_url: Option<String>,

    /// Re-cut output: trim timestamp in seconds from the segment start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_timestamp: Option<f64>,

    /// Re-cut output: judge similarity score in [0,1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuity_score: Option<f64>,

    /// Pre-trim video URL, preserved when a re-cut replaces the asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_video_url: Option<String>,
}

/// One segment's generated media. Owned exclusively by its job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Asset {
    /// 0-based segment index, contiguous and unique within the job
    pub segment_id: u32,

    /// Current status
    #[serde(default)]
    pub status: AssetStatus,

    /// Persisted (or provider-transient fallback) video URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Synthesized narration audio URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,

    /// Terminal error, if the segment failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Provider and continuity bookkeeping
    #[serde(default)]
    pub metadata: AssetMetadata,
}

impl Asset {
    /// Create a pending asset for a segment.
    pub fn pending(segment_id: u32) -> Self {
        Self {
            segment_id,
            status: AssetStatus::Pending,
            video_url: None,
            voice_url: None,
            error: None,
            metadata: AssetMetadata::default(),
        }
    }

    /// Mark the asset failed with a terminal error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = AssetStatus::Failed;
        self.error = Some(error.into());
        self.metadata.finished_at = Some(Utc::now());
    }

    /// Mark the asset completed with its persisted video URL.
    pub fn complete(&mut self, video_url: impl Into<String>) {
        self.status = AssetStatus::Completed;
        self.video_url = Some(video_url.into());
        self.metadata.finished_at = Some(Utc::now());
    }
}

/// The unit of work covering generation of all segments for one storyboard.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Unique job ID
    pub id: JobId,

    /// Aggregate status, derived from asset statuses; a final assembly
    /// failure also moves it to `Failed`
    #[serde(default)]
    pub status: JobStatus,

    /// When the job was submitted
    pub start_time: DateTime<Utc>,

    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Storyboard this job generates media for
    pub storyboard_id: StoryboardId,

    /// Per-segment assets, indexed by `segment_id`
    pub assets: Vec<Asset>,

    /// Job-level error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Background music track, when the storyboard carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_url: Option<String>,

    /// Composed final video, recorded once assembly has persisted it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
}

impl GenerationJob {
    /// Create a new processing job with pending assets for `segment_ids`.
    pub fn new(storyboard_id: StoryboardId, segment_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Processing,
            start_time: Utc::now(),
            end_time: None,
            storyboard_id,
            assets: segment_ids.into_iter().map(Asset::pending).collect(),
            error: None,
            music_url: None,
            final_video_url: None,
        }
    }

    /// Look up an asset by segment id.
    pub fn asset(&self, segment_id: u32) -> Option<&Asset> {
        self.assets.iter().find(|a| a.segment_id == segment_id)
    }

    /// Look up an asset mutably by segment id.
    pub fn asset_mut(&mut self, segment_id: u32) -> Option<&mut Asset> {
        self.assets.iter_mut().find(|a| a.segment_id == segment_id)
    }

    /// Aggregate status as a pure function of asset statuses.
    ///
    /// `Failed` wins immediately once any asset fails, even while siblings
    /// are still processing. Preserved deliberately; see DESIGN.md.
    pub fn derive_status(&self) -> JobStatus {
        if self.assets.iter().any(|a| a.status == AssetStatus::Failed) {
            JobStatus::Failed
        } else if self
            .assets
            .iter()
            .all(|a| a.status == AssetStatus::Completed)
        {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        }
    }

    /// Recompute `status`, stamping `end_time` on the terminal transition.
    pub fn refresh_status(&mut self) {
        let derived = self.derive_status();
        if derived.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        self.status = derived;
    }

    /// Build the read-only status projection exposed to pollers.
    pub fn snapshot(&self) -> JobStatusSnapshot {
        let total = self.assets.len() as u32;
        let completed = self
            .assets
            .iter()
            .filter(|a| a.status == AssetStatus::Completed)
            .count() as u32;
        let overall_progress = if total == 0 {
            0
        } else {
            (completed * 100) / total
        };

        JobStatusSnapshot {
            status: self.status,
            overall_progress,
            segments: self
                .assets
                .iter()
                .map(|a| SegmentSnapshot {
                    segment_id: a.segment_id,
                    status: a.status,
                    progress: match a.status {
                        AssetStatus::Completed => 100,
                        AssetStatus::Processing => 50,
                        _ => 0,
                    },
                    error: a.error.clone(),
                    video_url: a.video_url.clone(),
                    voice_url: a.voice_url.clone(),
                })
                .collect(),
            error: self.error.clone(),
            final_video_url: self.final_video_url.clone(),
        }
    }
}

/// Read-only job status exposed to concurrent pollers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    /// `completed_segments / total_segments × 100`
    pub overall_progress: u32,
    pub segments: Vec<SegmentSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
}

/// Per-segment slice of the status projection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSnapshot {
    pub segment_id: u32,
    pub status: AssetStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_statuses(statuses: &[AssetStatus]) -> GenerationJob {
        let mut job = GenerationJob::new(
            StoryboardId::from_string("sb-1"),
            0..statuses.len() as u32,
        );
        for (asset, status) in job.assets.iter_mut().zip(statuses) {
            asset.status = *status;
        }
        job
    }

    #[test]
    fn status_is_pure_function_of_assets() {
        use AssetStatus::*;

        let all_done = job_with_statuses(&[Completed, Completed, Completed, Completed]);
        assert_eq!(all_done.derive_status(), JobStatus::Completed);

        let one_failed = job_with_statuses(&[Completed, Failed, Processing, Pending]);
        assert_eq!(one_failed.derive_status(), JobStatus::Failed);

        let in_flight = job_with_statuses(&[Completed, Processing, Pending]);
        assert_eq!(in_flight.derive_status(), JobStatus::Processing);
    }

    #[test]
    fn failure_wins_while_siblings_still_processing() {
        // Fail-fast aggregate: a single failed asset flips the job even
        // mid-flight. This mirrors the documented open question.
        let job = job_with_statuses(&[AssetStatus::Processing, AssetStatus::Failed]);
        assert_eq!(job.derive_status(), JobStatus::Failed);
    }

    #[test]
    fn refresh_status_stamps_end_time_once() {
        let mut job = job_with_statuses(&[AssetStatus::Completed]);
        assert!(job.end_time.is_none());

        job.refresh_status();
        assert_eq!(job.status, JobStatus::Completed);
        let first = job.end_time.expect("end_time set on terminal transition");

        job.refresh_status();
        assert_eq!(job.end_time, Some(first));
    }

    #[test]
    fn snapshot_progress_counts_completed_segments() {
        let job = job_with_statuses(&[
            AssetStatus::Completed,
            AssetStatus::Completed,
            AssetStatus::Processing,
            AssetStatus::Pending,
        ]);
        let snapshot = job.snapshot();
        assert_eq!(snapshot.overall_progress, 50);
        assert_eq!(snapshot.segments.len(), 4);
        assert_eq!(snapshot.segments[0].progress, 100);
        assert_eq!(snapshot.segments[2].progress, 50);
    }

    #[test]
    fn asset_terminal_helpers() {
        let mut asset = Asset::pending(0);
        assert_eq!(asset.status, AssetStatus::Pending);

        asset.complete("https://cdn.example/seg0.mp4");
        assert_eq!(asset.status, AssetStatus::Completed);
        assert!(asset.metadata.finished_at.is_some());

        let mut failed = Asset::pending(1);
        failed.fail("provider rejected prompt");
        assert_eq!(failed.status, AssetStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("provider rejected prompt"));
    }
}
