//! Mux reconciled audio with the source video.

use std::path::PathBuf;
use tracing::{info, warn};
use vscore_models::encoding::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_AUDIO_CODEC, DEFAULT_CRF, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC,
};
use vscore_models::TrimWindow;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Inputs for one mux job.
#[derive(Debug, Clone)]
pub struct RecombineRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub window: TrimWindow,
    /// Duration of the whole source video
    pub source_duration: f64,
    /// Accepted |output - window| in seconds
    pub tolerance: f64,
}

impl RecombineRequest {
    pub fn target_duration(&self) -> f64 {
        self.window.duration()
    }

    /// The video stream can be copied only when no cut is needed.
    pub fn can_copy_video(&self) -> bool {
        self.window.covers(self.source_duration, self.tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecombineOutcome {
    /// Probed duration of the output
    pub duration: f64,
    /// Mux attempts made (1 or 2)
    pub attempts: u32,
}

/// Build the mux command. `force_duration` pads the audio and caps the
/// output at the target duration.
pub fn mux_command(request: &RecombineRequest, force_duration: bool) -> FfmpegCommand {
    let target = request.target_duration();
    let copy_video = request.can_copy_video();

    let mut cmd = FfmpegCommand::new(&request.video, &request.output);
    if !copy_video {
        // Stream copy can only cut on keyframes.
        cmd = cmd.seek(request.window.start).duration(target);
    }
    cmd = cmd.add_input(&request.audio).map("0:v:0").map("1:a:0");

    cmd = if copy_video {
        cmd.video_codec("copy")
    } else {
        cmd.video_codec(DEFAULT_VIDEO_CODEC)
            .preset(DEFAULT_PRESET)
            .crf(DEFAULT_CRF)
    };
    cmd = cmd
        .audio_codec(DEFAULT_AUDIO_CODEC)
        .audio_bitrate(DEFAULT_AUDIO_BITRATE);

    if force_duration {
        cmd = cmd
            .audio_filter(format!("apad=whole_dur={:.6}", target))
            .output_duration(target);
    }

    cmd.output_arg("-movflags").output_arg("+faststart")
}

/// Mux, re-probe, and retry once with a forced duration if needed.
pub async fn recombine(request: &RecombineRequest, runner: &FfmpegRunner) -> MediaResult<RecombineOutcome> {
    let target = request.target_duration();
    let mut last_problem = String::new();

    for attempt in 1..=2u32 {
        let force_duration = attempt > 1;
        let cmd = mux_command(request, force_duration);

        match runner.run(&cmd).await {
            Ok(()) => {}
            Err(e) if e.is_missing_tool() => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "Mux attempt failed");
                last_problem = e.to_string();
                continue;
            }
        }

        let duration = match probe_video(&request.output).await {
            Ok(info) => info.duration,
            Err(e) => {
                warn!(attempt, error = %e, "Could not probe muxed output");
                last_problem = e.to_string();
                continue;
            }
        };

        if (duration - target).abs() <= request.tolerance {
            info!(
                attempt,
                duration_secs = duration,
                target_secs = target,
                copy_video = request.can_copy_video(),
                "Muxed final video"
            );
            return Ok(RecombineOutcome {
                duration,
                attempts: attempt,
            });
        }

        warn!(
            attempt,
            duration_secs = duration,
            target_secs = target,
            "Muxed duration outside tolerance"
        );
        last_problem = format!(
            "output duration {:.3}s differs from target {:.3}s by more than {:.3}s",
            duration, target, request.tolerance
        );
    }

    Err(MediaError::combination_failed(2, last_problem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: f64, end: f64, source: f64) -> RecombineRequest {
        RecombineRequest {
            video: PathBuf::from("video.mp4"),
            audio: PathBuf::from("music.wav"),
            output: PathBuf::from("final.mp4"),
            window: TrimWindow::new(start, end).unwrap(),
            source_duration: source,
            tolerance: 1.0 / 30.0,
        }
    }

    #[test]
    fn test_full_window_copies_video() {
        let args = mux_command(&request(0.0, 15.0, 15.0), false).build_args();
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[cv + 1], "copy");
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-af".to_string()));
        assert!(args.windows(2).any(|w| w == ["-map", "1:a:0"]));
    }

    #[test]
    fn test_sub_window_reencodes_and_seeks() {
        let args = mux_command(&request(2.0, 12.0, 15.0), false).build_args();
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[cv + 1], DEFAULT_VIDEO_CODEC);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < first_input);
        assert_eq!(args[ss + 1], "2.000");
    }

    #[test]
    fn test_forced_duration_pads_and_caps() {
        let args = mux_command(&request(0.0, 15.0, 15.0), true).build_args();
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], "apad=whole_dur=15.000000");
        let last_input = args.iter().rposition(|a| a == "-i").unwrap();
        let t = args.iter().rposition(|a| a == "-t").unwrap();
        assert!(t > last_input);
        assert_eq!(args[t + 1], "15.000");
    }
}
