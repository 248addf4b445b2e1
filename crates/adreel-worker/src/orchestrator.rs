//! Segment job orchestrator.
//!
//! Fans a storyboard out into one generation task per segment, polls the
//! video provider to a terminal state, persists results to durable
//! storage, and keeps the job record current so concurrent pollers see
//! incremental progress. A segment failure never aborts its siblings;
//! every launched segment runs to its own terminal state. When every
//! segment completes, the final video is assembled, persisted, and
//! recorded on the job.

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::warn;

use adreel_jobs::JobStore;
use adreel_models::{AssetStatus, GenerationJob, JobId, JobStatus, StorySegment, Storyboard};
use adreel_providers::{
    FrameClassifier, GenerationRequest, PredictionPoll, SpeechSynthesizer, VideoGenerator,
};
use adreel_storage::StorageSink;

use crate::assembly;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::narration::extract_narration;

/// Negative prompt applied to every generation request. AI video models
/// are weakest at faces and hands, so those artifacts are always pushed
/// away from.
const FACE_QUALITY_NEGATIVE: &str = "distorted face, deformed face, asymmetric eyes, \
     extra fingers, warped hands, blurry face, uncanny expression";

/// Appended to the negative prompt when an input frame appears to show
/// a minor.
const CHILD_SAFETY_NEGATIVE: &str = ", child, children, minor, underage person";

/// Appended to the visual prompt on the single moderation retry.
const SAFE_PROMPT_SUFFIX: &str = " The scene is wholesome, family-friendly, and safe \
     for all audiences.";

const SEGMENT_FOLDER: &str = "segments";
const VOICE_FOLDER: &str = "voice";

/// Run one generation job for a storyboard to completion.
///
/// The job record is created immediately and updated incrementally as
/// segments resolve, so its snapshot can be polled while this future is
/// still running. Returns the job id; per-segment failures are recorded
/// on the job rather than surfaced as an `Err`.
pub async fn run_generation_job(
    ctx: &ProcessingContext,
    storyboard: &Storyboard,
) -> WorkerResult<JobId> {
    validate_storyboard(storyboard)?;

    let selected: Vec<StorySegment> = if ctx.config.demo_mode {
        storyboard
            .segments
            .iter()
            .take(ctx.config.demo_segment_cap)
            .cloned()
            .collect()
    } else {
        storyboard.segments.clone()
    };

    let mut job = GenerationJob::new(
        storyboard.id.clone(),
        selected.iter().map(|s| s.segment_id),
    );
    job.music_url = storyboard.music_url.clone();
    let job_id = job.id.clone();
    ctx.store.create(job).await?;

    let logger = JobLogger::new(&job_id, "segment_generation");
    logger.log_start(&format!("generating {} segment(s)", selected.len()));

    let mut tasks = JoinSet::new();
    for segment in &selected {
        let ctx = ctx.clone();
        let job_id = job_id.clone();
        let segment = segment.clone();
        tasks.spawn(async move {
            generate_segment(&ctx, &job_id, &segment).await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            logger.log_error(&format!("segment task panicked: {e}"));
        }
    }

    synthesize_voices(ctx, &job_id, &selected).await;

    let job = ctx
        .store
        .update(
            &job_id,
            Box::new(|job| {
                job.refresh_status();
                if job.status == JobStatus::Failed && job.error.is_none() {
                    let failed = job
                        .assets
                        .iter()
                        .filter(|a| a.status == AssetStatus::Failed)
                        .count();
                    job.error = Some(format!("{failed} segment(s) failed"));
                }
            }),
        )
        .await?;

    if job.status != JobStatus::Completed {
        logger.log_error(&format!("job finished {}", job.status.as_str()));
        return Ok(job_id);
    }
    logger.log_progress("all segments generated, assembling final video");

    match assembly::assemble_final_video(ctx, &job_id, &selected).await {
        Ok(Some(url)) => {
            let recorded = url.clone();
            let result = ctx
                .store
                .update(
                    &job_id,
                    Box::new(move |job| {
                        job.final_video_url = Some(recorded);
                    }),
                )
                .await;
            match result {
                Ok(_) => logger.log_completion(&format!("final video ready: {url}")),
                Err(e) => logger.log_error(&format!("could not record final video: {e}")),
            }
        }
        Ok(None) => logger.log_completion("final video rendered but not persisted"),
        Err(e) => {
            let message = format!("final assembly failed: {e}");
            logger.log_error(&message);
            let result = ctx
                .store
                .update(
                    &job_id,
                    Box::new(move |job| {
                        job.status = JobStatus::Failed;
                        job.error = Some(message);
                    }),
                )
                .await;
            if let Err(e) = result {
                logger.log_error(&format!("store update failed: {e}"));
            }
        }
    }
    Ok(job_id)
}

/// Storyboards must be non-empty with contiguous 0-based segment ids.
fn validate_storyboard(storyboard: &Storyboard) -> WorkerResult<()> {
    if storyboard.segments.is_empty() {
        return Err(WorkerError::invalid_storyboard("no segments"));
    }
    for (position, segment) in storyboard.segments.iter().enumerate() {
        if segment.segment_id as usize != position {
            return Err(WorkerError::invalid_storyboard(format!(
                "segment ids must be contiguous from 0, found {} at position {}",
                segment.segment_id, position
            )));
        }
        if segment.duration_secs <= 0.0 {
            return Err(WorkerError::invalid_storyboard(format!(
                "segment {} has non-positive duration",
                segment.segment_id
            )));
        }
    }
    Ok(())
}

/// Drive one segment to a terminal asset status. Never returns an error:
/// every failure path records itself on the job.
async fn generate_segment(ctx: &ProcessingContext, job_id: &JobId, segment: &StorySegment) {
    let logger = JobLogger::new(job_id, "segment_generation");
    let segment_id = segment.segment_id;

    let marked = ctx
        .store
        .update(
            job_id,
            Box::new(move |job| {
                if let Some(asset) = job.asset_mut(segment_id) {
                    asset.status = AssetStatus::Processing;
                    asset.metadata.started_at = Some(Utc::now());
                }
            }),
        )
        .await;
    if let Err(e) = marked {
        logger.log_error(&format!("segment {segment_id}: store update failed: {e}"));
        return;
    }

    let negative_prompt = build_negative_prompt(ctx, segment).await;
    let request = GenerationRequest {
        prompt: segment.prompt.clone(),
        duration_secs: segment.duration_secs,
        aspect_ratio: ctx.config.aspect_ratio.clone(),
        first_frame_url: segment.first_frame_url.clone(),
        last_frame_url: segment.last_frame_url.clone(),
        negative_prompt: Some(negative_prompt),
        resolution: Some(ctx.config.resolution.clone()),
        seed: None,
    };

    match generate_with_retry(ctx, job_id, segment_id, request, &logger).await {
        Ok(provider_url) => {
            // Persist to durable storage; fall back to the provider's
            // transient URL when persistence fails so the segment still
            // completes.
            let final_url = match persist_media(ctx, &provider_url, SEGMENT_FOLDER, "video/mp4")
                .await
            {
                Ok(url) => url,
                Err(e) => {
                    logger.log_warning(&format!(
                        "segment {segment_id}: persistence failed, keeping provider URL: {e}"
                    ));
                    provider_url
                }
            };
            let first_frame_url = segment.first_frame_url.clone();
            let result = ctx
                .store
                .update(
                    job_id,
                    Box::new(move |job| {
                        if let Some(asset) = job.asset_mut(segment_id) {
                            asset.complete(final_url);
                            asset.metadata.first_frame_url = first_frame_url;
                        }
                        job.refresh_status();
                    }),
                )
                .await;
            if let Err(e) = result {
                logger.log_error(&format!("segment {segment_id}: store update failed: {e}"));
            } else {
                logger.log_progress(&format!("segment {segment_id} completed"));
            }
        }
        Err(message) => {
            logger.log_error(&format!("segment {segment_id} failed: {message}"));
            let result = ctx
                .store
                .update(
                    job_id,
                    Box::new(move |job| {
                        if let Some(asset) = job.asset_mut(segment_id) {
                            asset.fail(message);
                        }
                        job.refresh_status();
                    }),
                )
                .await;
            if let Err(e) = result {
                logger.log_error(&format!("segment {segment_id}: store update failed: {e}"));
            }
        }
    }
}

/// Assemble the negative prompt for a segment. Classifier errors are
/// logged and treated as "not flagged" so generation is never blocked
/// on the classifier being down.
async fn build_negative_prompt(ctx: &ProcessingContext, segment: &StorySegment) -> String {
    let mut negative = FACE_QUALITY_NEGATIVE.to_string();
    for frame_url in [&segment.first_frame_url, &segment.last_frame_url]
        .into_iter()
        .flatten()
    {
        match ctx.classifier.contains_minor(frame_url).await {
            Ok(true) => {
                negative.push_str(CHILD_SAFETY_NEGATIVE);
                break;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(segment_id = segment.segment_id, "frame classification failed: {e}");
            }
        }
    }
    negative
}

/// Submit a generation request and poll it to a terminal state, retrying
/// exactly once with a safety-augmented prompt on a moderation rejection.
/// Returns the provider media URL on success, or the terminal error text.
async fn generate_with_retry(
    ctx: &ProcessingContext,
    job_id: &JobId,
    segment_id: u32,
    mut request: GenerationRequest,
    logger: &JobLogger,
) -> Result<String, String> {
    let mut retried = false;
    loop {
        let prediction_id = match ctx.video.create(&request).await {
            Ok(id) => id,
            Err(e) => return Err(format!("generation request failed: {e}")),
        };

        let recorded_id = prediction_id.clone();
        let record = ctx
            .store
            .update(
                job_id,
                Box::new(move |job| {
                    if let Some(asset) = job.asset_mut(segment_id) {
                        asset.metadata.prediction_id = Some(recorded_id);
                    }
                }),
            )
            .await;
        if let Err(e) = record {
            logger.log_warning(&format!(
                "segment {segment_id}: could not record prediction id: {e}"
            ));
        }

        match poll_to_terminal(ctx, &prediction_id).await {
            Ok(PredictionPoll::Succeeded { output_url }) => {
                return match output_url {
                    Some(url) => Ok(url),
                    None => ctx
                        .video
                        .fetch_result(&prediction_id)
                        .await
                        .map_err(|e| format!("result fetch failed: {e}")),
                };
            }
            Ok(PredictionPoll::Failed {
                error,
                moderation_flagged,
            }) => {
                if moderation_flagged && !retried {
                    retried = true;
                    logger.log_warning(&format!(
                        "segment {segment_id} moderation-flagged, retrying with safe prompt"
                    ));
                    let mark = ctx
                        .store
                        .update(
                            job_id,
                            Box::new(move |job| {
                                if let Some(asset) = job.asset_mut(segment_id) {
                                    asset.metadata.retry_attempted = true;
                                }
                            }),
                        )
                        .await;
                    if let Err(e) = mark {
                        logger.log_warning(&format!(
                            "segment {segment_id}: could not record retry: {e}"
                        ));
                    }
                    request.prompt.push_str(SAFE_PROMPT_SUFFIX);
                    continue;
                }
                return Err(error);
            }
            Ok(PredictionPoll::Processing) => unreachable!("poll_to_terminal returns terminal"),
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Poll a prediction until it leaves `Processing` or the attempt budget
/// runs out.
async fn poll_to_terminal(
    ctx: &ProcessingContext,
    prediction_id: &str,
) -> WorkerResult<PredictionPoll> {
    for attempt in 0..ctx.config.max_poll_attempts {
        if attempt > 0 {
            tokio::time::sleep(ctx.config.poll_interval).await;
        }
        match ctx.video.poll(prediction_id).await? {
            PredictionPoll::Processing => continue,
            terminal => return Ok(terminal),
        }
    }
    Err(WorkerError::GenerationTimeout {
        prediction_id: prediction_id.to_string(),
        attempts: ctx.config.max_poll_attempts,
    })
}

/// Download media from a provider URL and re-upload it to durable storage.
async fn persist_media(
    ctx: &ProcessingContext,
    url: &str,
    folder: &str,
    content_type: &str,
) -> WorkerResult<String> {
    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("persist-")
        .tempdir_in(&ctx.config.work_dir)?;
    let local = ctx.storage.fetch(url, &dir.path().join("media")).await?;
    let data = tokio::fs::read(&local).await?;
    Ok(ctx.storage.put(data, folder, content_type).await?)
}

/// Synthesize narration audio for every completed segment whose
/// annotation carries extractable narration. Voice failures are logged
/// and tolerated: the segment keeps its completed status without audio.
async fn synthesize_voices(ctx: &ProcessingContext, job_id: &JobId, segments: &[StorySegment]) {
    let job = match ctx.store.get(job_id).await {
        Ok(job) => job,
        Err(e) => {
            warn!(job_id = %job_id, "voice pass skipped, job fetch failed: {e}");
            return;
        }
    };

    let mut tasks = JoinSet::new();
    for segment in segments {
        let completed = job
            .asset(segment.segment_id)
            .map(|a| a.status == AssetStatus::Completed)
            .unwrap_or(false);
        if !completed {
            continue;
        }
        let Some(text) = extract_narration(&segment.annotation) else {
            continue;
        };
        let voice = segment
            .voice
            .clone()
            .unwrap_or_else(|| ctx.config.default_voice.clone());
        let ctx = ctx.clone();
        let job_id = job_id.clone();
        let segment_id = segment.segment_id;
        tasks.spawn(async move {
            synthesize_segment_voice(&ctx, &job_id, segment_id, &text, &voice).await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(job_id = %job_id, "voice task panicked: {e}");
        }
    }
}

async fn synthesize_segment_voice(
    ctx: &ProcessingContext,
    job_id: &JobId,
    segment_id: u32,
    text: &str,
    voice: &str,
) {
    let logger = JobLogger::new(job_id, "voice_synthesis");
    let audio = match ctx.speech.synthesize(text, voice).await {
        Ok(audio) => audio,
        Err(e) => {
            logger.log_warning(&format!("segment {segment_id}: synthesis failed: {e}"));
            return;
        }
    };
    let url = match ctx.storage.put(audio, VOICE_FOLDER, "audio/mpeg").await {
        Ok(url) => url,
        Err(e) => {
            logger.log_warning(&format!("segment {segment_id}: voice upload failed: {e}"));
            return;
        }
    };
    let result = ctx
        .store
        .update(
            job_id,
            Box::new(move |job| {
                if let Some(asset) = job.asset_mut(segment_id) {
                    asset.voice_url = Some(url);
                }
            }),
        )
        .await;
    match result {
        Ok(_) => logger.log_progress(&format!("segment {segment_id} voice ready")),
        Err(e) => logger.log_warning(&format!("segment {segment_id}: store update failed: {e}")),
    }
}
