//! FFmpeg CLI wrapper for the VScore pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multi-input support
//! - Progress parsing from `-progress pipe:2`
//! - Media probing via ffprobe
//! - Lazy frame sampling with backward search on decode failures
//! - Audio duration reconciliation (trim, loop, pad)
//! - Audio/video recombination with duration verification

pub mod command;
pub mod error;
pub mod frames;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod recombine;
pub mod toolkit;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{sample_timestamps, FfmpegFrameDecoder, FrameDecoder, FrameSampler, SampledFrame};
pub use probe::{probe_audio_duration, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use reconcile::{plan_reconciliation, reconcile_audio, ReconcileOptions, ReconcilePlan};
pub use recombine::{mux_command, recombine, RecombineOutcome, RecombineRequest};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
