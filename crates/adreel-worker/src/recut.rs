//! Continuity re-cut service.
//!
//! After generation, the boundary between a segment and its successor
//! can jump visually. The re-cut samples frames from the tail of a
//! segment, asks the multimodal frame judge which one best matches the
//! successor's first frame, trims the segment at that frame, and swaps
//! the trimmed asset in while preserving the original URL.

use std::path::Path;

use tracing::info;

use adreel_jobs::JobStore;
use adreel_media::{frames, probe_video};
use adreel_models::{AssetStatus, JobId};
use adreel_providers::{FrameJudge, FrameJudgment};
use adreel_storage::StorageSink;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Tail window sampled for cut candidates, in seconds.
const RECUT_WINDOW_SECS: f64 = 1.0;

/// Candidate sampling rate within the window.
const RECUT_SAMPLE_FPS: u32 = 30;

/// Outcome of a re-cut, echoed back to the caller.
#[derive(Debug, Clone)]
pub struct RecutOutcome {
    pub segment_id: u32,
    pub trimmed_video_url: String,
    pub trim_timestamp: f64,
    pub continuity_score: f64,
    pub differences: Vec<String>,
}

/// Re-cut `segment_id` of `job_id` against its successor's first frame.
///
/// Preconditions are checked before any media is touched; a precondition
/// failure leaves the stored job untouched. The last segment has no
/// successor and cannot be re-cut.
pub async fn recut_segment(
    ctx: &ProcessingContext,
    job_id: &JobId,
    segment_id: u32,
) -> WorkerResult<RecutOutcome> {
    let logger = JobLogger::new(job_id, "continuity_recut");
    let job = ctx
        .store
        .get(job_id)
        .await
        .map_err(|_| WorkerError::JobNotFound(job_id.clone()))?;

    let asset = job
        .asset(segment_id)
        .ok_or(WorkerError::SegmentNotFound(segment_id as usize))?;
    if asset.status != AssetStatus::Completed {
        return Err(WorkerError::SegmentHasNoVideo(segment_id as usize));
    }
    let video_url = asset
        .video_url
        .clone()
        .ok_or(WorkerError::SegmentHasNoVideo(segment_id as usize))?;

    let successor = job
        .asset(segment_id + 1)
        .ok_or(WorkerError::NoSuccessorSegment(segment_id as usize))?;
    let target_frame_url = successor
        .metadata
        .first_frame_url
        .clone()
        .or_else(|| successor.video_url.clone())
        .ok_or(WorkerError::SegmentHasNoFrame(segment_id as usize + 1))?;
    let target_is_video = successor.metadata.first_frame_url.is_none();

    logger.log_start(&format!("re-cutting segment {segment_id}"));

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("recut-")
        .tempdir_in(&ctx.config.work_dir)?;

    let local_video = ctx
        .storage
        .fetch(&video_url, &dir.path().join("segment.mp4"))
        .await?;
    let target_frame = resolve_target_frame(ctx, &target_frame_url, target_is_video, dir.path())
        .await?;

    let info = probe_video(&local_video).await?;
    let candidates = frames::extract_trailing_frames(
        &local_video,
        info.duration,
        RECUT_WINDOW_SECS,
        RECUT_SAMPLE_FPS,
        &dir.path().join("candidates"),
    )
    .await?;

    let judgment = ctx.judge.select_best_frame(&candidates, &target_frame).await?;
    let trim_timestamp = cut_timestamp(info.duration, RECUT_WINDOW_SECS, RECUT_SAMPLE_FPS, &judgment);

    let trimmed_path = dir.path().join("trimmed.mp4");
    frames::trim_video(&local_video, &trimmed_path, trim_timestamp).await?;

    let data = tokio::fs::read(&trimmed_path).await?;
    let trimmed_url = ctx.storage.put(data, "segments", "video/mp4").await?;

    let outcome = RecutOutcome {
        segment_id,
        trimmed_video_url: trimmed_url.clone(),
        trim_timestamp,
        continuity_score: judgment.similarity,
        differences: judgment.differences.clone(),
    };

    let original_url = video_url.clone();
    ctx.store
        .update(
            job_id,
            Box::new(move |job| {
                if let Some(asset) = job.asset_mut(segment_id) {
                    if asset.metadata.original_video_url.is_none() {
                        asset.metadata.original_video_url = Some(original_url);
                    }
                    asset.video_url = Some(trimmed_url.clone());
                    asset.metadata.trimmed_video_url = Some(trimmed_url);
                    asset.metadata.trim_timestamp = Some(trim_timestamp);
                    asset.metadata.continuity_score = Some(judgment.similarity);
                }
            }),
        )
        .await?;

    info!(
        job_id = %job_id,
        segment_id,
        trim_timestamp,
        continuity_score = outcome.continuity_score,
        "segment re-cut"
    );
    logger.log_completion(&format!(
        "segment {segment_id} trimmed at {trim_timestamp:.3}s"
    ));
    Ok(outcome)
}

/// The judge's pick maps back to a timestamp: the window starts at
/// `duration - window` and candidates are spaced `1 / sample_fps` apart.
fn cut_timestamp(duration: f64, window_secs: f64, sample_fps: u32, judgment: &FrameJudgment) -> f64 {
    let window_start = (duration - window_secs).max(0.0);
    window_start + judgment.selected_index as f64 / sample_fps as f64
}

/// The target is the successor's first frame image when recorded, else
/// the first frame is pulled out of the successor's video.
async fn resolve_target_frame(
    ctx: &ProcessingContext,
    url: &str,
    is_video: bool,
    work_dir: &Path,
) -> WorkerResult<std::path::PathBuf> {
    if is_video {
        let successor_video = ctx.storage.fetch(url, &work_dir.join("successor.mp4")).await?;
        let frame = work_dir.join("target.png");
        frames::extract_first_frame(&successor_video, &frame).await?;
        Ok(frame)
    } else {
        Ok(ctx.storage.fetch(url, &work_dir.join("target.png")).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;

    use adreel_jobs::{JobStore, MemoryJobStore};
    use adreel_models::{GenerationJob, StoryboardId};
    use adreel_providers::{
        FrameClassifier, FrameJudge, GenerationRequest, PredictionPoll, ProviderError,
        ProviderResult, SpeechSynthesizer, VideoGenerator,
    };
    use adreel_storage::{StorageResult, StorageSink};

    use crate::assembly::Compositor;
    use crate::config::WorkerConfig;

    struct UnusedVideo;

    #[async_trait]
    impl VideoGenerator for UnusedVideo {
        async fn create(&self, _request: &GenerationRequest) -> ProviderResult<String> {
            Err(ProviderError::request_failed("not under test"))
        }
        async fn poll(&self, _prediction_id: &str) -> ProviderResult<PredictionPoll> {
            Err(ProviderError::request_failed("not under test"))
        }
        async fn fetch_result(&self, _prediction_id: &str) -> ProviderResult<String> {
            Err(ProviderError::request_failed("not under test"))
        }
    }

    struct UnusedSpeech;

    #[async_trait]
    impl SpeechSynthesizer for UnusedSpeech {
        async fn synthesize(&self, _text: &str, _voice: &str) -> ProviderResult<Vec<u8>> {
            Err(ProviderError::request_failed("not under test"))
        }
    }

    struct UnusedClassifier;

    #[async_trait]
    impl FrameClassifier for UnusedClassifier {
        async fn contains_minor(&self, _image_url: &str) -> ProviderResult<bool> {
            Ok(false)
        }
    }

    struct UnusedJudge;

    #[async_trait]
    impl FrameJudge for UnusedJudge {
        async fn select_best_frame(
            &self,
            _candidates: &[PathBuf],
            _target: &Path,
        ) -> ProviderResult<FrameJudgment> {
            Err(ProviderError::request_failed("not under test"))
        }
    }

    struct UnusedCompositor;

    #[async_trait]
    impl Compositor for UnusedCompositor {
        async fn render(
            &self,
            _clips: &mut [adreel_models::Clip],
            _options: &adreel_models::CompositionOptions,
        ) -> adreel_media::MediaResult<PathBuf> {
            panic!("compositor must not be touched on precondition failures")
        }
    }

    struct UnusedStorage;

    #[async_trait]
    impl StorageSink for UnusedStorage {
        async fn put(
            &self,
            _data: Vec<u8>,
            _folder: &str,
            _content_type: &str,
        ) -> StorageResult<String> {
            panic!("storage must not be touched on precondition failures")
        }
        async fn fetch(&self, _url: &str, _dest: &Path) -> StorageResult<PathBuf> {
            panic!("storage must not be touched on precondition failures")
        }
    }

    fn ctx_with_store(store: Arc<MemoryJobStore>) -> ProcessingContext {
        ProcessingContext::new(
            WorkerConfig::default(),
            store,
            Arc::new(UnusedStorage),
            Arc::new(UnusedVideo),
            Arc::new(UnusedSpeech),
            Arc::new(UnusedClassifier),
            Arc::new(UnusedJudge),
            Arc::new(UnusedCompositor),
        )
    }

    async fn seeded_job(store: &MemoryJobStore) -> JobId {
        let mut job = GenerationJob::new(StoryboardId::from_string("sb-1"), 0..3);
        for asset in &mut job.assets {
            asset.complete(format!("https://store.example/segments/{}", asset.segment_id));
        }
        job.assets[1].metadata.first_frame_url =
            Some("https://store.example/frames/1.png".to_string());
        job.refresh_status();
        let id = job.id.clone();
        store.create(job).await.unwrap();
        id
    }

    #[tokio::test]
    async fn unknown_job_is_a_precondition_failure() {
        let store = Arc::new(MemoryJobStore::new());
        let ctx = ctx_with_store(store);
        let err = recut_segment(&ctx, &JobId::from_string("ghost"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn unknown_segment_is_rejected() {
        let store = Arc::new(MemoryJobStore::new());
        let job_id = seeded_job(&store).await;
        let ctx = ctx_with_store(store);
        let err = recut_segment(&ctx, &job_id, 9).await.unwrap_err();
        assert!(matches!(err, WorkerError::SegmentNotFound(9)));
    }

    #[tokio::test]
    async fn last_segment_has_no_successor() {
        let store = Arc::new(MemoryJobStore::new());
        let job_id = seeded_job(&store).await;
        let ctx = ctx_with_store(store.clone());

        let err = recut_segment(&ctx, &job_id, 2).await.unwrap_err();
        assert!(matches!(err, WorkerError::NoSuccessorSegment(2)));

        // Precondition failures leave the stored job untouched.
        let job = store.get(&job_id).await.unwrap();
        assert!(job.asset(2).unwrap().metadata.trimmed_video_url.is_none());
        assert!(job.asset(2).unwrap().metadata.original_video_url.is_none());
    }

    #[tokio::test]
    async fn incomplete_segment_cannot_be_recut() {
        let store = Arc::new(MemoryJobStore::new());
        let mut job = GenerationJob::new(StoryboardId::from_string("sb-2"), 0..2);
        job.assets[1].complete("https://store.example/segments/1");
        let job_id = job.id.clone();
        store.create(job).await.unwrap();

        let ctx = ctx_with_store(store);
        let err = recut_segment(&ctx, &job_id, 0).await.unwrap_err();
        assert!(matches!(err, WorkerError::SegmentHasNoVideo(0)));
    }

    #[test]
    fn cut_timestamp_maps_candidate_index_into_tail_window() {
        let judgment = FrameJudgment {
            selected_index: 15,
            similarity: 0.8,
            differences: Vec::new(),
            reasoning: String::new(),
        };
        // 10s clip, 1s window at 30fps: candidate 15 sits half a second
        // into the window.
        let ts = cut_timestamp(10.0, 1.0, 30, &judgment);
        assert!((ts - 9.5).abs() < 1e-9);

        // Clips shorter than the window start sampling at zero.
        let early = cut_timestamp(0.5, 1.0, 30, &judgment);
        assert!((early - 0.5).abs() < 1e-9);
    }
}
