//! Fit generated audio to the video duration.
//!
//! Planning is pure: [`plan_reconciliation`] picks one policy from the
//! raw audio duration `A` and the target `V`. Execution renders the plan
//! to a single ffmpeg invocation producing 16-bit PCM WAV.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use vscore_models::encoding::{
    FADE_OUT_SECS, MIN_LOOPABLE_AUDIO_SECS, MIN_PARTIAL_LOOP_SECS, RECONCILED_AUDIO_CODEC,
};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Silence source used when the raw audio is too short to decode.
const SILENCE_SOURCE: &str = "anullsrc=r=44100:cl=stereo";

/// Tunables for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOptions {
    /// Accepted |A - V| without touching the audio
    pub tolerance: f64,
    /// Fade-out length when trimming
    pub fade_secs: f64,
    /// Audio below this length is padded instead of looped
    pub min_loopable_secs: f64,
}

impl ReconcileOptions {
    /// Defaults with a tolerance of one frame interval.
    pub fn for_frame_interval(frame_interval: f64) -> Self {
        Self {
            tolerance: frame_interval,
            fade_secs: FADE_OUT_SECS,
            min_loopable_secs: MIN_LOOPABLE_AUDIO_SECS,
        }
    }
}

/// The single policy chosen for one piece of audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconcilePlan {
    /// Already within tolerance
    Unchanged { duration: f64 },
    /// Cut to `[0, target]` with a fade-out ending at `target`
    Trim { target: f64, fade: f64 },
    /// Repeat the audio, trimming the last repetition
    Loop {
        source: f64,
        full_loops: u32,
        partial: f64,
        target: f64,
    },
    /// Keep the audio and fill the rest with silence
    Pad {
        audio: f64,
        silence: f64,
        target: f64,
    },
}

/// Choose a policy for raw audio of `audio_secs` against `target_secs`.
///
/// Negative or non-finite audio durations count as zero. Fails with
/// [`MediaError::InvalidTargetDuration`] when the target is not positive.
pub fn plan_reconciliation(
    audio_secs: f64,
    target_secs: f64,
    options: &ReconcileOptions,
) -> MediaResult<ReconcilePlan> {
    if !target_secs.is_finite() || target_secs <= 0.0 {
        return Err(MediaError::InvalidTargetDuration(target_secs));
    }
    let audio = if audio_secs.is_finite() { audio_secs.max(0.0) } else { 0.0 };
    let tolerance = options.tolerance.max(0.0);

    if (audio - target_secs).abs() <= tolerance {
        return Ok(ReconcilePlan::Unchanged { duration: audio });
    }

    if audio > target_secs {
        return Ok(ReconcilePlan::Trim {
            target: target_secs,
            fade: options.fade_secs.clamp(0.0, target_secs),
        });
    }

    if audio < options.min_loopable_secs.max(MIN_PARTIAL_LOOP_SECS) {
        return Ok(ReconcilePlan::Pad {
            audio,
            silence: target_secs - audio,
            target: target_secs,
        });
    }

    let full_loops = (target_secs / audio).floor() as u32;
    let mut partial = target_secs - f64::from(full_loops) * audio;
    // Dropping a sliver must not cost more than the tolerance allows.
    if partial < MIN_PARTIAL_LOOP_SECS.min(tolerance) {
        partial = 0.0;
    }
    Ok(ReconcilePlan::Loop {
        source: audio,
        full_loops,
        partial,
        target: target_secs,
    })
}

impl ReconcilePlan {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcilePlan::Unchanged { .. } => "unchanged",
            ReconcilePlan::Trim { .. } => "trim",
            ReconcilePlan::Loop { .. } => "loop",
            ReconcilePlan::Pad { .. } => "pad",
        }
    }

    /// Duration of the audio the plan produces.
    pub fn output_duration(&self) -> f64 {
        match *self {
            ReconcilePlan::Unchanged { duration } => duration,
            ReconcilePlan::Trim { target, .. } => target,
            ReconcilePlan::Loop {
                source,
                full_loops,
                partial,
                ..
            } => source * f64::from(full_loops) + partial,
            ReconcilePlan::Pad { audio, silence, .. } => audio + silence,
        }
    }

    /// Render the plan as an ffmpeg command; `None` means copy the input.
    pub fn to_command(&self, input: &Path, output: &Path) -> Option<FfmpegCommand> {
        match *self {
            ReconcilePlan::Unchanged { .. } => None,
            ReconcilePlan::Trim { target, fade } => Some(
                FfmpegCommand::new(input, output)
                    .no_video()
                    .audio_filter(format!(
                        "atrim=end={:.6},afade=t=out:st={:.6}:d={:.6}",
                        target,
                        target - fade,
                        fade
                    ))
                    .audio_codec(RECONCILED_AUDIO_CODEC),
            ),
            ReconcilePlan::Loop {
                full_loops,
                partial,
                target,
                ..
            } => {
                // -stream_loop N plays the input N + 1 times.
                let extra_plays = if partial > 0.0 {
                    full_loops
                } else {
                    full_loops.saturating_sub(1)
                };
                Some(
                    FfmpegCommand::new(input, output)
                        .stream_loop(extra_plays)
                        .no_video()
                        .audio_filter(format!("atrim=end={:.6},asetpts=N/SR/TB", target))
                        .audio_codec(RECONCILED_AUDIO_CODEC),
                )
            }
            ReconcilePlan::Pad { audio, target, .. } => {
                let cmd = if audio > 0.0 {
                    FfmpegCommand::new(input, output)
                } else {
                    FfmpegCommand::new(SILENCE_SOURCE, output)
                        .input_arg("-f")
                        .input_arg("lavfi")
                };
                Some(
                    cmd.no_video()
                        .audio_filter(format!("apad=whole_dur={:.6},atrim=end={:.6}", target, target))
                        .audio_codec(RECONCILED_AUDIO_CODEC),
                )
            }
        }
    }
}

/// Execute a plan, writing WAV audio to `output`.
pub async fn reconcile_audio(
    plan: &ReconcilePlan,
    input: &Path,
    output: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    info!(
        policy = plan.label(),
        output_secs = plan.output_duration(),
        "Reconciling audio duration"
    );
    match plan.to_command(input, output) {
        None => {
            tokio::fs::copy(input, output).await?;
            Ok(())
        }
        Some(cmd) => runner.run(&cmd).await,
    }
}
