//! Sampled frame models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{RunId, VideoId};

/// One sampled frame stored in object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRef {
    /// Position in sampling order (0-based)
    pub index: u32,
    /// Timestamp the sampler asked for
    pub requested_secs: f64,
    /// Timestamp actually decoded
    pub timestamp_secs: f64,
    /// True when a nearby timestamp was substituted
    #[serde(default)]
    pub substituted: bool,
    pub locator: String,
}

/// Ordered frames of one run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameSet {
    pub video_id: VideoId,
    pub run_id: RunId,
    pub frames: Vec<FrameRef>,
    pub created_at: DateTime<Utc>,
}

impl FrameSet {
    pub fn new(video_id: VideoId, run_id: RunId, frames: Vec<FrameRef>) -> Self {
        Self {
            video_id,
            run_id,
            frames,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn substituted_count(&self) -> usize {
        self.frames.iter().filter(|f| f.substituted).count()
    }
}
