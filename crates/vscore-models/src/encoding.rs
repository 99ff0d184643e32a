//! Encoding and pipeline defaults shared by the media layer.

/// Default video codec when the video must be re-encoded (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec for the final container
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate for the final container
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Codec of reconciled intermediate audio (16-bit PCM WAV)
pub const RECONCILED_AUDIO_CODEC: &str = "pcm_s16le";

/// Frames sampled per run
pub const DEFAULT_FRAME_COUNT: u32 = 5;
/// JPEG quality passed to `-q:v` when extracting frames (2 = high)
pub const FRAME_JPEG_QUALITY: u8 = 2;
/// How far back the sampler searches when a timestamp fails to decode
pub const DEFAULT_FRAME_SEARCH_WINDOW_SECS: f64 = 1.0;
/// Smallest backward search step
pub const MIN_FRAME_SEARCH_STEP_SECS: f64 = 0.04;

/// Fade-out applied when trimming generated audio
pub const FADE_OUT_SECS: f64 = 0.05;
/// Audio shorter than this is padded with silence instead of looped
pub const MIN_LOOPABLE_AUDIO_SECS: f64 = 1.0;
/// Partial loops shorter than this are dropped
pub const MIN_PARTIAL_LOOP_SECS: f64 = 0.001;
/// Frame interval assumed when the frame rate is unknown (30 fps)
pub const FALLBACK_FRAME_INTERVAL_SECS: f64 = 1.0 / 30.0;

/// Prompt used whenever vision analysis produces nothing usable
pub const FALLBACK_PROMPT: &str = "Ambient instrumental background music with gentle textures, \
     soft piano and warm strings, calm and atmospheric mood.";
