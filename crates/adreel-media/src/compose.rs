//! Multi-track composition: compiles an ordered clip list into a single
//! FFmpeg filter graph and runs the encode.
//!
//! The graph is built deterministically from the inputs: per-clip video
//! normalization (trim → reset timestamps → pixel format → scale-to-fit →
//! center pad → fixed frame rate), hard-cut concatenation in index order,
//! and a mixed audio bed (embedded audio, voice tracks, optional looped
//! background music, or synthesized silence when nothing else exists).

use std::path::PathBuf;

use adreel_models::{Clip, CompositionOptions};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Fixed output frame rate; the 1-second keyframe interval (`-g`) is
/// derived from it.
pub const OUTPUT_FPS: u32 = 30;

/// Tolerance for timeline contiguity checks, seconds.
const TIMELINE_EPSILON: f64 = 1e-6;

/// A compiled composition ready for FFmpeg execution.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    /// Ordered inputs: clips first, then voice tracks, then music/silence
    pub inputs: Vec<FfmpegInput>,
    /// The full `-filter_complex` graph
    pub filter_graph: String,
    /// Output encoding arguments
    pub output_args: Vec<String>,
    /// Destination file
    pub output_path: PathBuf,
    /// Timeline duration, equal to the sum of clip durations
    pub total_duration: f64,
}

/// Compile clips and options into a render plan. Pure and deterministic:
/// identical inputs yield an identical plan.
pub fn compile(clips: &[Clip], options: &CompositionOptions) -> MediaResult<CompositionPlan> {
    if clips.is_empty() {
        return Err(MediaError::EmptyComposition);
    }
    validate_timeline(clips)?;

    let total_duration: f64 = clips.iter().map(|c| c.duration()).sum();
    let width = options.output_width;
    let height = options.output_height;

    let mut inputs: Vec<FfmpegInput> = clips
        .iter()
        .map(|c| FfmpegInput::file(&c.local_path))
        .collect();
    let mut filters: Vec<String> = Vec::new();

    // Per-clip video chain, then hard-cut concat in index order.
    for (i, clip) in clips.iter().enumerate() {
        filters.push(format!(
            "[{i}:v]trim=duration={dur:.3},setpts=PTS-STARTPTS,format=yuv420p,\
             scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps}[v{i}]",
            dur = clip.duration(),
            w = width,
            h = height,
            fps = OUTPUT_FPS,
        ));
    }
    let concat_inputs: String = (0..clips.len()).map(|i| format!("[v{i}]")).collect();
    filters.push(format!(
        "{concat_inputs}concat=n={}:v=1:a=0[vout]",
        clips.len()
    ));

    // Audio: one labelled stream per source, mixed at the end.
    let mut audio_labels: Vec<String> = Vec::new();

    for (i, clip) in clips.iter().enumerate() {
        let delay_ms = (clip.start_time * 1000.0).round() as i64;

        if clip.has_audio {
            filters.push(format!(
                "[{i}:a]atrim=duration={dur:.3},asetpts=PTS-STARTPTS,\
                 adelay={delay_ms}|{delay_ms}[ca{i}]",
                dur = clip.duration(),
            ));
            audio_labels.push(format!("[ca{i}]"));
        } else if !clip.timing_hints.is_empty() {
            // Per-word alignment: each hint is its own delayed input.
            for (k, hint) in clip.timing_hints.iter().enumerate() {
                let idx = inputs.len();
                inputs.push(FfmpegInput::file(&hint.path));
                let hint_delay = ((clip.start_time + hint.start) * 1000.0).round() as i64;
                filters.push(format!(
                    "[{idx}:a]atrim=duration={dur:.3},asetpts=PTS-STARTPTS,\
                     adelay={hint_delay}|{hint_delay}[va{i}_{k}]",
                    dur = (hint.end - hint.start).max(0.0),
                ));
                audio_labels.push(format!("[va{i}_{k}]"));
            }
        } else if let Some(voice) = &clip.voice_path {
            let idx = inputs.len();
            inputs.push(FfmpegInput::file(voice));
            filters.push(format!(
                "[{idx}:a]atrim=duration={dur:.3},asetpts=PTS-STARTPTS,\
                 adelay={delay_ms}|{delay_ms}[va{i}]",
                dur = clip.duration(),
            ));
            audio_labels.push(format!("[va{i}]"));
        }
    }

    if let Some(music) = &options.background_music_path {
        let idx = inputs.len();
        inputs.push(FfmpegInput::file_looped(music));
        let volume = f64::from(options.music_volume.min(100)) / 100.0;
        filters.push(format!(
            "[{idx}:a]atrim=duration={total_duration:.3},asetpts=PTS-STARTPTS,\
             volume={volume:.2}[bgm]",
        ));
        audio_labels.push("[bgm]".to_string());
    }

    if audio_labels.is_empty() {
        // The output must always carry a valid audio stream.
        let idx = inputs.len();
        inputs.push(FfmpegInput::lavfi(
            "anullsrc=channel_layout=stereo:sample_rate=44100",
        ));
        filters.push(format!(
            "[{idx}:a]atrim=duration={total_duration:.3},asetpts=PTS-STARTPTS[aout]",
        ));
    } else {
        let mix_inputs = audio_labels.concat();
        filters.push(format!(
            "{mix_inputs}amix=inputs={}:duration=longest:dropout_transition=0[aout]",
            audio_labels.len()
        ));
    }

    // Fixed encode parameters for broad playback compatibility.
    let output_args: Vec<String> = [
        "-map", "[vout]",
        "-map", "[aout]",
        "-c:v", "libx264",
        "-preset", "medium",
        "-crf", "18",
        "-pix_fmt", "yuv420p",
        "-g", &OUTPUT_FPS.to_string(),
        "-keyint_min", &OUTPUT_FPS.to_string(),
        "-movflags", "+faststart",
        "-c:a", "aac",
        "-b:a", "192k",
        "-ar", "44100",
        "-t", &format!("{:.3}", total_duration),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    Ok(CompositionPlan {
        inputs,
        filter_graph: filters.join(";"),
        output_args,
        output_path: options.output_path.clone(),
        total_duration,
    })
}

/// Compile and run a composition, returning the output path.
///
/// Any graph-construction or encode error is surfaced verbatim; no
/// partial output is reported as success.
pub async fn compose(clips: &[Clip], options: &CompositionOptions) -> MediaResult<PathBuf> {
    let plan = compile(clips, options)?;

    info!(
        clips = clips.len(),
        duration = plan.total_duration,
        output = %plan.output_path.display(),
        "composing final video"
    );
    debug!("filter graph: {}", plan.filter_graph);

    let mut cmd = FfmpegCommand::new(&plan.output_path).filter_complex(&plan.filter_graph);
    for input in &plan.inputs {
        cmd = cmd.input(input.clone());
    }
    cmd = cmd.output_args(plan.output_args.iter().cloned());

    FfmpegRunner::new().run(&cmd).await?;
    Ok(plan.output_path)
}

/// Reject non-contiguous, overlapping, or non-positive-duration timelines.
fn validate_timeline(clips: &[Clip]) -> MediaResult<()> {
    for (i, clip) in clips.iter().enumerate() {
        if clip.duration() <= 0.0 {
            return Err(MediaError::invalid_timeline(format!(
                "clip {} has non-positive duration ({:.3}s)",
                i,
                clip.duration()
            )));
        }
    }
    for (i, pair) in clips.windows(2).enumerate() {
        if (pair[0].end_time - pair[1].start_time).abs() > TIMELINE_EPSILON {
            return Err(MediaError::invalid_timeline(format!(
                "clip {} ends at {:.3}s but clip {} starts at {:.3}s",
                i,
                pair[0].end_time,
                i + 1,
                pair[1].start_time
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::TimingHint;
    use std::path::PathBuf;

    fn clip(start: f64, end: f64, has_audio: bool) -> Clip {
        Clip {
            local_path: PathBuf::from(format!("/tmp/clip_{start}.mp4")),
            voice_path: None,
            start_time: start,
            end_time: end,
            has_audio,
            timing_hints: Vec::new(),
        }
    }

    fn options() -> CompositionOptions {
        CompositionOptions::new("/tmp/out.mp4")
    }

    #[test]
    fn empty_composition_is_rejected() {
        assert!(matches!(
            compile(&[], &options()),
            Err(MediaError::EmptyComposition)
        ));
    }

    #[test]
    fn single_clip_graph_has_concat_of_one() {
        let plan = compile(&[clip(0.0, 5.0, true)], &options()).unwrap();
        assert!(plan.filter_graph.contains("concat=n=1:v=1:a=0[vout]"));
        assert!(plan.filter_graph.contains("trim=duration=5.000"));
        assert!(plan.filter_graph.contains("setpts=PTS-STARTPTS"));
        assert!((plan.total_duration - 5.0).abs() < 1e-9);
    }

    #[test]
    fn clips_concat_in_index_order_with_normalization() {
        let plan = compile(&[clip(0.0, 4.0, true), clip(4.0, 9.0, true)], &options()).unwrap();
        assert!(plan.filter_graph.contains("[v0][v1]concat=n=2:v=1:a=0[vout]"));
        assert!(plan
            .filter_graph
            .contains("scale=1080:1920:force_original_aspect_ratio=decrease"));
        assert!(plan
            .filter_graph
            .contains("pad=1080:1920:(ow-iw)/2:(oh-ih)/2"));
        assert!(plan.filter_graph.contains("format=yuv420p"));
        assert!(plan.filter_graph.contains("fps=30"));
    }

    #[test]
    fn non_contiguous_timeline_is_rejected() {
        let err = compile(&[clip(0.0, 4.0, true), clip(5.0, 9.0, true)], &options()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidTimeline(_)));
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let err = compile(&[clip(3.0, 3.0, true)], &options()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidTimeline(_)));
    }

    #[test]
    fn embedded_audio_is_trimmed_and_delayed() {
        let plan = compile(&[clip(0.0, 4.0, true), clip(4.0, 9.0, true)], &options()).unwrap();
        assert!(plan.filter_graph.contains("[0:a]atrim=duration=4.000"));
        assert!(plan.filter_graph.contains("adelay=4000|4000[ca1]"));
        assert!(plan
            .filter_graph
            .contains("amix=inputs=2:duration=longest:dropout_transition=0[aout]"));
    }

    #[test]
    fn voice_track_fallback_when_no_embedded_audio() {
        let mut second = clip(4.0, 9.0, false);
        second.voice_path = Some(PathBuf::from("/tmp/voice_1.mp3"));

        let plan = compile(&[clip(0.0, 4.0, true), second], &options()).unwrap();
        // Voice file is appended as input 2, after the two clips
        assert!(plan.inputs[2].source.ends_with("voice_1.mp3"));
        assert!(plan.filter_graph.contains("[2:a]atrim=duration=5.000"));
        assert!(plan.filter_graph.contains("adelay=4000|4000[va1]"));
    }

    #[test]
    fn timing_hints_split_voice_into_aligned_segments() {
        let mut c = clip(2.0, 7.0, false);
        c.voice_path = Some(PathBuf::from("/tmp/voice.mp3"));
        c.timing_hints = vec![
            TimingHint {
                start: 0.5,
                end: 1.0,
                path: PathBuf::from("/tmp/word_0.mp3"),
            },
            TimingHint {
                start: 1.5,
                end: 2.2,
                path: PathBuf::from("/tmp/word_1.mp3"),
            },
        ];

        let plan = compile(&[clip(0.0, 2.0, true), c], &options()).unwrap();
        // Hints win over the whole-track voice fallback
        assert!(plan.filter_graph.contains("adelay=2500|2500[va1_0]"));
        assert!(plan.filter_graph.contains("adelay=3500|3500[va1_1]"));
        assert!(!plan.filter_graph.contains("[va1]amix") && !plan.filter_graph.contains("adelay=2000|2000[va1]"));
        assert!(plan
            .filter_graph
            .contains("amix=inputs=3:duration=longest"));
    }

    #[test]
    fn background_music_is_looped_trimmed_and_attenuated() {
        let mut opts = options();
        opts.background_music_path = Some(PathBuf::from("/tmp/music.mp3"));
        opts.music_volume = 25;

        let plan = compile(&[clip(0.0, 6.0, true)], &opts).unwrap();
        let music_input = plan.inputs.last().unwrap();
        assert!(music_input.args.contains(&"-stream_loop".to_string()));
        assert!(plan.filter_graph.contains("atrim=duration=6.000"));
        assert!(plan.filter_graph.contains("volume=0.25[bgm]"));
        assert!(plan.filter_graph.contains("amix=inputs=2:duration=longest"));
    }

    #[test]
    fn silent_track_synthesized_when_no_audio_sources() {
        let plan = compile(&[clip(0.0, 3.0, false), clip(3.0, 5.0, false)], &options()).unwrap();
        let silence = plan.inputs.last().unwrap();
        assert!(silence.source.starts_with("anullsrc"));
        assert!(silence.args.contains(&"lavfi".to_string()));
        assert!(plan.filter_graph.contains("atrim=duration=5.000,asetpts=PTS-STARTPTS[aout]"));
        assert!(!plan.filter_graph.contains("amix"));
    }

    #[test]
    fn encode_parameters_guarantee_playback_compatibility() {
        let plan = compile(&[clip(0.0, 5.0, true)], &options()).unwrap();
        let args = plan.output_args.join(" ");
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("-crf 18"));
        assert!(args.contains("-pix_fmt yuv420p"));
        assert!(args.contains("-g 30")); // 1s keyframe interval at 30 fps
        assert!(args.contains("-movflags +faststart"));
        assert!(args.contains("-c:a aac"));
    }

    #[test]
    fn output_duration_equals_clip_duration_sum() {
        let clips = [
            clip(0.0, 3.5, true),
            clip(3.5, 8.25, true),
            clip(8.25, 10.0, true),
        ];
        let plan = compile(&clips, &options()).unwrap();
        assert!((plan.total_duration - 10.0).abs() < 1e-9);
        let args = plan.output_args.join(" ");
        assert!(args.contains("-t 10.000"));
    }

    #[test]
    fn compile_is_deterministic() {
        let clips = [clip(0.0, 4.0, true), clip(4.0, 9.0, false)];
        let a = compile(&clips, &options()).unwrap();
        let b = compile(&clips, &options()).unwrap();
        assert_eq!(a.filter_graph, b.filter_graph);
        assert_eq!(a.output_args, b.output_args);
    }
}
