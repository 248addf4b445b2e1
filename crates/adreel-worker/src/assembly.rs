//! Final video assembly.
//!
//! Once every segment of a job has completed, the generated videos and
//! voice tracks are pulled back from storage, laid out as a contiguous
//! clip timeline, stitch-optimized, and rendered into the single output
//! video that gets persisted and recorded on the job.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use adreel_jobs::JobStore;
use adreel_media::{
    compose, optimize_transitions, MediaResult, DEFAULT_SAMPLE_COUNT, DEFAULT_SAMPLE_WINDOW_SECS,
};
use adreel_models::{Clip, CompositionOptions, JobId, StorySegment};
use adreel_storage::StorageSink;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

const FINAL_FOLDER: &str = "videos";

/// Renders a clip timeline into an output file. Trait-object seam so
/// orchestration can be exercised without FFmpeg on the host.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn render(
        &self,
        clips: &mut [Clip],
        options: &CompositionOptions,
    ) -> MediaResult<PathBuf>;
}

/// Production compositor: stitch-point optimization followed by the
/// filter-graph render.
pub struct FfmpegCompositor;

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn render(
        &self,
        clips: &mut [Clip],
        options: &CompositionOptions,
    ) -> MediaResult<PathBuf> {
        let adjustments = optimize_transitions(
            clips,
            options.transition,
            DEFAULT_SAMPLE_WINDOW_SECS,
            DEFAULT_SAMPLE_COUNT,
        )
        .await;
        for adj in adjustments.iter().filter(|a| a.trimmed_seconds > 0.0) {
            info!(
                clip_index = adj.clip_index,
                trimmed_seconds = adj.trimmed_seconds,
                similarity = adj.similarity,
                "stitch point adjusted"
            );
        }
        compose(clips, options).await
    }
}

/// Local media for one segment, ready to be placed on the timeline.
pub struct SegmentMedia {
    pub video: PathBuf,
    pub voice: Option<PathBuf>,
    pub duration_secs: f64,
}

/// Lay segment media out as a contiguous clip timeline: each clip starts
/// where the previous one ends, so the planned total duration is the sum
/// of the segment durations.
pub fn build_timeline(media: &[SegmentMedia]) -> Vec<Clip> {
    let mut clips = Vec::with_capacity(media.len());
    let mut cursor = 0.0;
    for item in media {
        clips.push(Clip {
            local_path: item.video.clone(),
            voice_path: item.voice.clone(),
            start_time: cursor,
            end_time: cursor + item.duration_secs,
            has_audio: false,
            timing_hints: Vec::new(),
        });
        cursor += item.duration_secs;
    }
    clips
}

/// Fetch every completed segment's media, render the final video, and
/// persist it. Returns the persisted URL, or `None` when the render
/// succeeded but the upload did not (the job keeps its completed status
/// either way; a render failure is the caller's to record).
pub async fn assemble_final_video(
    ctx: &ProcessingContext,
    job_id: &JobId,
    segments: &[StorySegment],
) -> WorkerResult<Option<String>> {
    let job = ctx.store.get(job_id).await?;

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("assemble-")
        .tempdir_in(&ctx.config.work_dir)?;

    let mut media = Vec::with_capacity(segments.len());
    for segment in segments {
        let segment_id = segment.segment_id;
        let asset = job
            .asset(segment_id)
            .ok_or(WorkerError::SegmentNotFound(segment_id as usize))?;
        let video_url = asset
            .video_url
            .as_deref()
            .ok_or(WorkerError::SegmentHasNoVideo(segment_id as usize))?;
        let video = ctx
            .storage
            .fetch(video_url, &dir.path().join(format!("segment_{segment_id}.mp4")))
            .await?;
        let voice = match asset.voice_url.as_deref() {
            Some(url) => Some(
                ctx.storage
                    .fetch(url, &dir.path().join(format!("voice_{segment_id}.mp3")))
                    .await?,
            ),
            None => None,
        };
        media.push(SegmentMedia {
            video,
            voice,
            duration_secs: segment.duration_secs,
        });
    }

    let mut clips = build_timeline(&media);
    let mut options = CompositionOptions::new(dir.path().join("final.mp4"));
    if let Some(music_url) = job.music_url.as_deref() {
        match ctx
            .storage
            .fetch(music_url, &dir.path().join("music.mp3"))
            .await
        {
            Ok(path) => options.background_music_path = Some(path),
            Err(e) => {
                warn!(job_id = %job_id, "music fetch failed, composing without music: {e}");
            }
        }
    }

    let output = ctx.compositor.render(&mut clips, &options).await?;
    let data = tokio::fs::read(&output).await?;
    match ctx.storage.put(data, FINAL_FOLDER, "video/mp4").await {
        Ok(url) => Ok(Some(url)),
        Err(e) => {
            warn!(job_id = %job_id, "final video upload failed, output kept unrecorded: {e}");
            Ok(None)
        }
    }
}
