//! Evenly spaced frame sampling across a trim window.
//!
//! [`FrameSampler::into_stream`] yields frames lazily in timestamp order.
//! When a timestamp cannot be decoded, earlier timestamps inside a small
//! search window are tried before the sample is declared failed.

use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use vscore_models::encoding::{
    DEFAULT_FRAME_SEARCH_WINDOW_SECS, FRAME_JPEG_QUALITY, MIN_FRAME_SEARCH_STEP_SECS,
};
use vscore_models::TrimWindow;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Seeking exactly to the end of a stream decodes nothing.
const END_NUDGE_SECS: f64 = 0.001;
const EPS: f64 = 1e-9;

/// Timestamps of `k` frames evenly spaced over the window.
///
/// `t_i = start + i * (end - start) / (k - 1)` for `k > 1`, the midpoint
/// for `k == 1`, nothing for `k == 0`.
pub fn sample_timestamps(window: &TrimWindow, k: u32) -> Vec<f64> {
    match k {
        0 => Vec::new(),
        1 => vec![window.start + window.duration() / 2.0],
        _ => {
            let step = window.duration() / f64::from(k - 1);
            (0..k)
                .map(|i| {
                    if i == k - 1 {
                        window.end
                    } else {
                        window.start + f64::from(i) * step
                    }
                })
                .collect()
        }
    }
}

/// A decoded frame ready for upload.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub index: u32,
    pub requested_secs: f64,
    pub timestamp_secs: f64,
    pub substituted: bool,
    /// JPEG bytes
    pub jpeg: Vec<u8>,
}

/// Decodes a single frame of a video as JPEG bytes.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn decode_frame(&self, video: &Path, timestamp: f64) -> MediaResult<Vec<u8>>;
}

/// Frame decoder backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameDecoder {
    scratch_dir: PathBuf,
    runner: FfmpegRunner,
}

impl FfmpegFrameDecoder {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            runner: FfmpegRunner::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl FrameDecoder for FfmpegFrameDecoder {
    async fn decode_frame(&self, video: &Path, timestamp: f64) -> MediaResult<Vec<u8>> {
        let output = self
            .scratch_dir
            .join(format!("frame_{}.jpg", (timestamp * 1000.0).round() as i64));

        // Input seeking is keyframe-accurate in ffmpeg >= 2.1.
        let cmd = FfmpegCommand::new(video, &output)
            .seek(timestamp)
            .single_frame(FRAME_JPEG_QUALITY);
        self.runner
            .run(&cmd)
            .await
            .map_err(|e| MediaError::extraction_failed(timestamp, e.to_string()))?;

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|_| MediaError::extraction_failed(timestamp, "no frame decoded"))?;
        let _ = tokio::fs::remove_file(&output).await;

        image::load_from_memory(&bytes)
            .map_err(|e| MediaError::extraction_failed(timestamp, format!("invalid image: {}", e)))?;

        Ok(bytes)
    }
}

/// Lazy sampler over one video and trim window.
pub struct FrameSampler {
    decoder: Arc<dyn FrameDecoder>,
    video: PathBuf,
    window: TrimWindow,
    timestamps: Vec<f64>,
    search_step: f64,
    search_window: f64,
}

impl FrameSampler {
    /// `frame_interval` is the source's frame duration (1/fps); it sets the
    /// step of the backward search.
    pub fn new(
        decoder: Arc<dyn FrameDecoder>,
        video: impl Into<PathBuf>,
        window: TrimWindow,
        frame_count: u32,
        frame_interval: f64,
    ) -> Self {
        Self {
            decoder,
            video: video.into(),
            timestamps: sample_timestamps(&window, frame_count),
            window,
            search_step: frame_interval.max(MIN_FRAME_SEARCH_STEP_SECS),
            search_window: DEFAULT_FRAME_SEARCH_WINDOW_SECS,
        }
    }

    pub fn with_search_window(mut self, secs: f64) -> Self {
        self.search_window = secs.max(0.0);
        self
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Candidate timestamps for one requested timestamp, nearest first.
    fn candidates(&self, requested: f64) -> Vec<f64> {
        let first = requested
            .min(self.window.end - END_NUDGE_SECS)
            .max(self.window.start);
        let mut out = vec![first];
        let mut offset = self.search_step;
        while offset <= self.search_window + EPS {
            let candidate = first - offset;
            if candidate < self.window.start - EPS {
                break;
            }
            out.push(candidate);
            offset += self.search_step;
        }
        out
    }

    async fn sample_one(&self, index: u32, requested: f64) -> MediaResult<SampledFrame> {
        let mut last_error = None;
        for (attempt, candidate) in self.candidates(requested).into_iter().enumerate() {
            match self.decoder.decode_frame(&self.video, candidate).await {
                Ok(jpeg) => {
                    if attempt > 0 {
                        warn!(
                            index,
                            requested_secs = requested,
                            timestamp_secs = candidate,
                            "Substituted nearby frame"
                        );
                    }
                    return Ok(SampledFrame {
                        index,
                        requested_secs: requested,
                        timestamp_secs: candidate,
                        substituted: attempt > 0,
                        jpeg,
                    });
                }
                Err(e) => {
                    debug!(index, timestamp_secs = candidate, error = %e, "Frame decode failed");
                    last_error = Some(e);
                }
            }
        }
        let cause = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate timestamps".to_string());
        Err(MediaError::extraction_failed(
            requested,
            format!("no decodable frame within {:.2}s: {}", self.search_window, cause),
        ))
    }

    /// Consume the sampler into an ordered stream of frames.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = MediaResult<SampledFrame>> + Send {
        stream::unfold((self, 0usize, false), |(sampler, next, failed)| async move {
            if failed || next >= sampler.timestamps.len() {
                return None;
            }
            let requested = sampler.timestamps[next];
            let result = sampler.sample_one(next as u32, requested).await;
            let failed = result.is_err();
            Some((result, (sampler, next + 1, failed)))
        })
    }

    /// Drive the stream to completion.
    pub async fn collect(self) -> MediaResult<Vec<SampledFrame>> {
        self.into_stream().try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Decoder that fails inside configured ranges and records calls.
    struct GappyDecoder {
        bad_ranges: Vec<(f64, f64)>,
        calls: Mutex<Vec<f64>>,
    }

    impl GappyDecoder {
        fn new(bad_ranges: Vec<(f64, f64)>) -> Arc<Self> {
            Arc::new(Self {
                bad_ranges,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FrameDecoder for GappyDecoder {
        async fn decode_frame(&self, _video: &Path, timestamp: f64) -> MediaResult<Vec<u8>> {
            self.calls.lock().unwrap().push(timestamp);
            if self
                .bad_ranges
                .iter()
                .any(|(lo, hi)| timestamp >= *lo && timestamp <= *hi)
            {
                return Err(MediaError::extraction_failed(timestamp, "corrupt"));
            }
            Ok(vec![0xFF, 0xD8])
        }
    }

    fn window(start: f64, end: f64) -> TrimWindow {
        TrimWindow::new(start, end).unwrap()
    }

    #[test]
    fn test_timestamps_evenly_spaced() {
        let ts = sample_timestamps(&window(0.0, 10.0), 5);
        assert_eq!(ts, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_single_timestamp_is_midpoint() {
        assert_eq!(sample_timestamps(&window(2.0, 6.0), 1), vec![4.0]);
        assert!(sample_timestamps(&window(2.0, 6.0), 0).is_empty());
    }

    #[tokio::test]
    async fn test_returns_exactly_k_frames_in_order() {
        for (start, end) in [(0.0, 0.2), (0.0, 15.0), (3.3, 7.1)] {
            let sampler = FrameSampler::new(
                GappyDecoder::new(vec![]),
                "v.mp4",
                window(start, end),
                5,
                1.0 / 30.0,
            );
            let frames = sampler.collect().await.unwrap();
            assert_eq!(frames.len(), 5);
            assert!(frames.windows(2).all(|w| w[0].timestamp_secs <= w[1].timestamp_secs));
            assert!(frames.iter().all(|f| f.timestamp_secs < end));
        }
    }

    #[tokio::test]
    async fn test_undecodable_timestamp_is_substituted() {
        let decoder = GappyDecoder::new(vec![(4.95, 5.05)]);
        let sampler = FrameSampler::new(decoder, "v.mp4", window(0.0, 10.0), 5, 1.0 / 30.0);
        let frames = sampler.collect().await.unwrap();

        let middle = &frames[2];
        assert!(middle.substituted);
        assert_eq!(middle.requested_secs, 5.0);
        assert!(middle.timestamp_secs < 4.95);
        assert!(5.0 - middle.timestamp_secs <= DEFAULT_FRAME_SEARCH_WINDOW_SECS);
        assert_eq!(frames.iter().filter(|f| f.substituted).count(), 1);
    }

    #[tokio::test]
    async fn test_fails_when_whole_window_is_bad() {
        let decoder = GappyDecoder::new(vec![(3.0, 6.0)]);
        let sampler = FrameSampler::new(decoder.clone(), "v.mp4", window(0.0, 10.0), 5, 0.1);
        let results: Vec<_> = sampler.into_stream().collect().await;

        // 0.0 and 2.5 decode, 5.0 fails, and the stream stops there.
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[2],
            Err(MediaError::ExtractionFailed { timestamp, .. }) if timestamp == 5.0
        ));
        let calls = decoder.calls.lock().unwrap();
        assert!(calls.iter().all(|t| *t < 7.5));
    }

    #[tokio::test]
    async fn test_search_never_goes_before_window_start() {
        let decoder = GappyDecoder::new(vec![(0.0, 2.05)]);
        let sampler = FrameSampler::new(decoder.clone(), "v.mp4", window(2.0, 4.0), 1, 0.5);
        // Midpoint 3.0 decodes fine.
        assert!(sampler.collect().await.is_ok());

        let sampler = FrameSampler::new(decoder.clone(), "v.mp4", window(2.0, 2.1), 1, 0.04);
        assert!(sampler.collect().await.is_err());
        assert!(decoder.calls.lock().unwrap().iter().all(|t| *t >= 2.0 - EPS));
    }
}
