//! Stitch-point optimization: picks the cut frame at the end of each clip
//! that best matches the start of the next one.

use std::path::Path;

use adreel_models::{Clip, StitchAdjustment, Transition};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frames::{extract_first_frame, extract_frame};
use crate::probe::probe_video;
use crate::similarity::score_frames;

/// Default analysis window at the end of the preceding clip, seconds.
pub const DEFAULT_SAMPLE_WINDOW_SECS: f64 = 1.0;

/// Default number of frames sampled within the window.
pub const DEFAULT_SAMPLE_COUNT: usize = 30;

/// Margin kept before the literal end of the clip; frame extraction at
/// the exact last timestamp is unreliable.
const END_SAFETY_MARGIN_SECS: f64 = 0.05;

/// Smallest clip duration a cut is allowed to leave behind.
const MIN_CLIP_DURATION_SECS: f64 = 0.1;

/// The chosen cut for one clip pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CutPoint {
    /// Source-relative timestamp of the best frame, seconds
    pub timestamp: f64,
    /// Similarity of that frame to the next clip's first frame, [0,1]
    pub similarity: f64,
    /// Index of the winning sample
    pub frame_index: usize,
}

/// Evenly spaced sample timestamps within the last `window_secs` of a
/// clip, all strictly before `duration` by the safety margin.
pub fn candidate_timestamps(duration: f64, window_secs: f64, samples: usize) -> Vec<f64> {
    if samples == 0 || duration <= 0.0 {
        return Vec::new();
    }

    let end = (duration - END_SAFETY_MARGIN_SECS).max(0.0);
    let start = (duration - window_secs).max(0.0).min(end);
    if samples == 1 {
        return vec![start];
    }

    let step = (end - start) / (samples - 1) as f64;
    (0..samples).map(|i| start + step * i as f64).collect()
}

/// Find the best cut point in the last `window_secs` of `preceding`,
/// scored against `next_first_frame`.
///
/// Always returns the highest-scoring sample, however low; no threshold
/// gates acceptance. Individual frame failures are skipped; only a run
/// where every sample failed is an error.
pub async fn find_best_cut(
    preceding: impl AsRef<Path>,
    preceding_duration: f64,
    next_first_frame: impl AsRef<Path>,
    window_secs: f64,
    samples: usize,
) -> MediaResult<CutPoint> {
    let preceding = preceding.as_ref();
    let next_first_frame = next_first_frame.as_ref();
    let timestamps = candidate_timestamps(preceding_duration, window_secs, samples);
    if timestamps.is_empty() {
        return Err(MediaError::NoFramesExtracted(format!(
            "no sample timestamps for {} (duration {:.3}s)",
            preceding.display(),
            preceding_duration
        )));
    }

    let temp_dir = tempfile::tempdir()?;
    let mut best: Option<CutPoint> = None;

    for (index, &timestamp) in timestamps.iter().enumerate() {
        let frame_path = temp_dir.path().join(format!("sample_{index:04}.png"));
        if let Err(e) = extract_frame(preceding, timestamp, &frame_path).await {
            warn!(
                "skipping sample {} at {:.3}s of {}: {}",
                index,
                timestamp,
                preceding.display(),
                e
            );
            continue;
        }

        let similarity = score_frames(&frame_path, next_first_frame);
        debug!(
            "sample {} at {:.3}s scored {:.4} against next first frame",
            index, timestamp, similarity
        );

        if best.as_ref().map(|b| similarity > b.similarity).unwrap_or(true) {
            best = Some(CutPoint {
                timestamp,
                similarity,
                frame_index: index,
            });
        }
    }

    best.ok_or_else(|| {
        MediaError::NoFramesExtracted(format!(
            "every sample frame failed for {}",
            preceding.display()
        ))
    })
}

/// Convert a source-relative cut timestamp into a new timeline end for
/// the clip, proportionally to its timeline duration.
///
/// Clamped so trimming only ever shrinks the clip, never extends it, and
/// never leaves a non-positive duration.
pub fn apply_cut(
    start_time: f64,
    end_time: f64,
    source_duration: f64,
    cut_timestamp: f64,
) -> (f64, f64) {
    let timeline_duration = end_time - start_time;
    if source_duration <= 0.0 || timeline_duration <= 0.0 {
        return (end_time, 0.0);
    }

    let fraction = (cut_timestamp / source_duration).clamp(0.0, 1.0);
    let mut new_end = start_time + timeline_duration * fraction;

    // Shrink only, and keep a usable remainder.
    new_end = new_end.min(end_time).max(start_time + MIN_CLIP_DURATION_SECS.min(timeline_duration));
    let trimmed = (end_time - new_end).max(0.0);
    (new_end, trimmed)
}

/// Optimize every adjacent clip pair in place, shifting later clips to
/// keep the timeline contiguous. One `StitchAdjustment` per pair; a
/// failing pair keeps its original timing with zero trim and zero
/// similarity recorded.
pub async fn optimize_transitions(
    clips: &mut [Clip],
    transition: Transition,
    window_secs: f64,
    samples: usize,
) -> Vec<StitchAdjustment> {
    let mut adjustments = Vec::new();
    let mut shift = 0.0;

    for i in 0..clips.len() {
        clips[i].start_time -= shift;
        clips[i].end_time -= shift;

        if i + 1 >= clips.len() {
            break;
        }

        let original_end = clips[i].end_time;
        let adjustment = match analyze_pair(&clips[i], &clips[i + 1], window_secs, samples).await {
            Ok(cut) => {
                let source_duration = match probe_video(&clips[i].local_path).await {
                    Ok(info) => info.duration,
                    Err(e) => {
                        warn!("probe failed for {}: {}", clips[i].local_path.display(), e);
                        0.0
                    }
                };
                let (new_end, trimmed) = apply_cut(
                    clips[i].start_time,
                    original_end,
                    source_duration,
                    cut.timestamp,
                );
                clips[i].end_time = new_end;
                shift += trimmed;

                StitchAdjustment {
                    clip_index: i,
                    original_end_time: original_end,
                    adjusted_end_time: new_end,
                    trimmed_seconds: trimmed,
                    similarity: cut.similarity,
                    transition_name: transition.as_str().to_string(),
                }
            }
            Err(e) => {
                // Per-transition isolation: keep original timing.
                warn!("stitch analysis failed for pair {}/{}: {}", i, i + 1, e);
                StitchAdjustment {
                    clip_index: i,
                    original_end_time: original_end,
                    adjusted_end_time: original_end,
                    trimmed_seconds: 0.0,
                    similarity: 0.0,
                    transition_name: transition.as_str().to_string(),
                }
            }
        };
        adjustments.push(adjustment);
    }

    adjustments
}

/// Extract the next clip's first frame and find the best cut in the
/// preceding clip against it.
async fn analyze_pair(
    preceding: &Clip,
    next: &Clip,
    window_secs: f64,
    samples: usize,
) -> MediaResult<CutPoint> {
    let info = probe_video(&preceding.local_path).await?;

    let temp_dir = tempfile::tempdir()?;
    let target = temp_dir.path().join("next_first.png");
    extract_first_frame(&next.local_path, &target).await?;

    find_best_cut(
        &preceding.local_path,
        info.duration,
        &target,
        window_secs,
        samples,
    )
    .await
}
