//! The media operations the pipeline depends on, behind one trait.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use vscore_models::TrimWindow;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::frames::{FfmpegFrameDecoder, FrameSampler};
use crate::probe::{self, VideoInfo};
use crate::reconcile::{self, ReconcilePlan};
use crate::recombine::{self, RecombineOutcome, RecombineRequest};

/// Media operations used by the orchestrator.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe_video(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// A lazy sampler for `frame_count` frames across `window`.
    fn frame_sampler(
        &self,
        video: &Path,
        window: TrimWindow,
        frame_count: u32,
        frame_interval: f64,
        scratch_dir: &Path,
    ) -> FrameSampler;

    async fn probe_audio_duration(&self, path: &Path) -> MediaResult<f64>;

    async fn reconcile_audio(&self, plan: &ReconcilePlan, input: &Path, output: &Path) -> MediaResult<()>;

    async fn recombine(&self, request: &RecombineRequest) -> MediaResult<RecombineOutcome>;
}

/// [`MediaToolkit`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    frame_timeout_secs: u64,
    encode_timeout_secs: u64,
    search_window_secs: f64,
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self {
            frame_timeout_secs: 30,
            encode_timeout_secs: 300,
            search_window_secs: vscore_models::encoding::DEFAULT_FRAME_SEARCH_WINDOW_SECS,
        }
    }
}

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for a single frame decode.
    pub fn with_frame_timeout(mut self, secs: u64) -> Self {
        self.frame_timeout_secs = secs;
        self
    }

    /// Timeout for reconcile and mux invocations.
    pub fn with_encode_timeout(mut self, secs: u64) -> Self {
        self.encode_timeout_secs = secs;
        self
    }

    pub fn with_search_window(mut self, secs: f64) -> Self {
        self.search_window_secs = secs;
        self
    }

    fn encode_runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.encode_timeout_secs)
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_video(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe::probe_video(path).await
    }

    fn frame_sampler(
        &self,
        video: &Path,
        window: TrimWindow,
        frame_count: u32,
        frame_interval: f64,
        scratch_dir: &Path,
    ) -> FrameSampler {
        let decoder = FfmpegFrameDecoder::new(scratch_dir).with_timeout(self.frame_timeout_secs);
        FrameSampler::new(Arc::new(decoder), video, window, frame_count, frame_interval)
            .with_search_window(self.search_window_secs)
    }

    async fn probe_audio_duration(&self, path: &Path) -> MediaResult<f64> {
        probe::probe_audio_duration(path).await
    }

    async fn reconcile_audio(&self, plan: &ReconcilePlan, input: &Path, output: &Path) -> MediaResult<()> {
        reconcile::reconcile_audio(plan, input, output, &self.encode_runner()).await
    }

    async fn recombine(&self, request: &RecombineRequest) -> MediaResult<RecombineOutcome> {
        recombine::recombine(request, &self.encode_runner()).await
    }
}
