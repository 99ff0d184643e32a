//! Video asset models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::ids::{PromptRecordId, VideoId};
use crate::status::{PipelineStage, PipelineStatus};

/// Pixel resolution of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Half-open segment `[start, end)` of a video, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    pub fn new(start: f64, end: f64) -> ModelResult<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(ModelError::InvalidTrimWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window spanning the whole video.
    pub fn full(duration: f64) -> ModelResult<Self> {
        Self::new(0.0, duration)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Clamp the window to `[0, media_duration]`.
    ///
    /// A window that ends up empty after clamping is an error.
    pub fn clamp_to(&self, media_duration: f64) -> ModelResult<Self> {
        Self::new(self.start.max(0.0), self.end.min(media_duration))
    }

    /// True when the window covers the whole media within `tolerance`.
    pub fn covers(&self, media_duration: f64, tolerance: f64) -> bool {
        self.start <= tolerance && (media_duration - self.end).abs() <= tolerance
    }
}

/// Facts reported by probing the stored media.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaFacts {
    pub duration_secs: f64,
    pub fps: f64,
    pub resolution: Resolution,
    pub frame_count: u64,
}

impl MediaFacts {
    /// Duration of one encoded frame.
    pub fn frame_interval(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            crate::encoding::FALLBACK_FRAME_INTERVAL_SECS
        }
    }
}

/// An uploaded video and its processing state.
///
/// The status fields are only written by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoAsset {
    pub id: VideoId,

    /// Original upload filename
    #[serde(default)]
    pub filename: Option<String>,

    /// Object storage locator of the uploaded file
    pub storage_locator: String,

    /// Probed media facts (absent until the first run probes the file)
    #[serde(default)]
    pub media: Option<MediaFacts>,

    /// Requested trim window; `None` means the whole video
    #[serde(default)]
    pub trim: Option<TrimWindow>,

    #[serde(default)]
    pub status: PipelineStatus,

    /// Human-readable cause of the last failure
    #[serde(default)]
    pub status_detail: Option<String>,

    /// Stage that produced the last failure
    #[serde(default)]
    pub failed_stage: Option<PipelineStage>,

    #[serde(default)]
    pub analysis_used_fallback: bool,

    /// Raw music prompt of the latest run, mirrored for inspection
    #[serde(default)]
    pub vision_analysis: Option<String>,

    /// Currently active prompt record
    #[serde(default)]
    pub active_prompt_id: Option<PromptRecordId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAsset {
    pub fn new(id: VideoId, storage_locator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: None,
            storage_locator: storage_locator.into(),
            media: None,
            trim: None,
            status: PipelineStatus::Uploaded,
            status_detail: None,
            failed_stage: None,
            analysis_used_fallback: false,
            vision_analysis: None,
            active_prompt_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_trim(mut self, trim: TrimWindow) -> Self {
        self.trim = Some(trim);
        self
    }

    /// Effective trim window for a media file of the given duration.
    pub fn effective_trim(&self, media_duration: f64) -> ModelResult<TrimWindow> {
        match self.trim {
            Some(trim) => trim.clamp_to(media_duration),
            None => TrimWindow::full(media_duration),
        }
    }
}
