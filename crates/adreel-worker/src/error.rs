//! Worker error types.

use thiserror::Error;

use adreel_models::JobId;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Invalid storyboard: {0}")]
    InvalidStoryboard(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Segment not found: {0}")]
    SegmentNotFound(usize),

    #[error("Segment {0} has no successor to blend into")]
    NoSuccessorSegment(usize),

    #[error("Segment {0} has no generated video to re-cut")]
    SegmentHasNoVideo(usize),

    #[error("Segment {0} has no first frame to compare against")]
    SegmentHasNoFrame(usize),

    #[error("Generation timed out after {attempts} polls: {prediction_id}")]
    GenerationTimeout { prediction_id: String, attempts: u32 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] adreel_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] adreel_storage::StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] adreel_providers::ProviderError),

    #[error("Job store error: {0}")]
    Store(#[from] adreel_jobs::JobStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_storyboard(msg: impl Into<String>) -> Self {
        Self::InvalidStoryboard(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if this is a precondition failure on a re-cut request.
    ///
    /// Precondition failures are reported to the caller without touching
    /// any stored asset state.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            WorkerError::JobNotFound(_)
                | WorkerError::SegmentNotFound(_)
                | WorkerError::NoSuccessorSegment(_)
                | WorkerError::SegmentHasNoVideo(_)
                | WorkerError::SegmentHasNoFrame(_)
        )
    }
}
