//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Interval between prediction status polls
    pub poll_interval: Duration,
    /// Maximum polls before a prediction is considered timed out
    pub max_poll_attempts: u32,
    /// Demo mode: only the first `demo_segment_cap` segments are generated
    pub demo_mode: bool,
    /// Segment cap applied when demo mode is enabled
    pub demo_segment_cap: usize,
    /// Work directory for temporary files
    pub work_dir: String,
    /// Voice used for narration when a segment does not name one
    pub default_voice: String,
    /// Aspect ratio requested from the video provider
    pub aspect_ratio: String,
    /// Resolution requested from the video provider
    pub resolution: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 240, // 20 minutes at the default interval
            demo_mode: false,
            demo_segment_cap: 2,
            work_dir: "/tmp/adreel".to_string(),
            default_voice: "narrator-f1".to_string(),
            aspect_ratio: "9:16".to_string(),
            resolution: "1080p".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("WORKER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_poll_attempts: std::env::var("WORKER_MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(240),
            demo_mode: std::env::var("WORKER_DEMO_MODE")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
            demo_segment_cap: std::env::var("WORKER_DEMO_SEGMENT_CAP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/adreel".to_string()),
            default_voice: std::env::var("WORKER_DEFAULT_VOICE")
                .unwrap_or_else(|_| "narrator-f1".to_string()),
            aspect_ratio: std::env::var("WORKER_ASPECT_RATIO")
                .unwrap_or_else(|_| "9:16".to_string()),
            resolution: std::env::var("WORKER_RESOLUTION").unwrap_or_else(|_| "1080p".to_string()),
        }
    }
}
