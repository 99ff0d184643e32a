//! Pipeline status and stage models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::VideoId;

/// Persisted processing status of a video asset.
///
/// Statuses are strictly ordered by [`PipelineStatus::rank`]; a failure
/// status shares the rank of the success status its stage would have
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Uploaded, not yet processed
    #[default]
    Uploaded,
    FramesExtracting,
    FramesExtracted,
    Analyzing,
    Analyzed,
    /// Vision analysis failed; the run continues with a fallback prompt
    AnalysisFailed,
    GeneratingMusic,
    MusicCompleted,
    CombiningVideo,
    Completed,
    FramesFailed,
    MusicFailed,
    CombinationFailed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Uploaded => "uploaded",
            PipelineStatus::FramesExtracting => "frames_extracting",
            PipelineStatus::FramesExtracted => "frames_extracted",
            PipelineStatus::Analyzing => "analyzing",
            PipelineStatus::Analyzed => "analyzed",
            PipelineStatus::AnalysisFailed => "analysis_failed",
            PipelineStatus::GeneratingMusic => "generating_music",
            PipelineStatus::MusicCompleted => "music_completed",
            PipelineStatus::CombiningVideo => "combining_video",
            PipelineStatus::Completed => "completed",
            PipelineStatus::FramesFailed => "frames_failed",
            PipelineStatus::MusicFailed => "music_failed",
            PipelineStatus::CombinationFailed => "combination_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|status| status.as_str() == s)
    }

    pub fn all() -> &'static [PipelineStatus] {
        &[
            PipelineStatus::Uploaded,
            PipelineStatus::FramesExtracting,
            PipelineStatus::FramesExtracted,
            PipelineStatus::Analyzing,
            PipelineStatus::Analyzed,
            PipelineStatus::AnalysisFailed,
            PipelineStatus::GeneratingMusic,
            PipelineStatus::MusicCompleted,
            PipelineStatus::CombiningVideo,
            PipelineStatus::Completed,
            PipelineStatus::FramesFailed,
            PipelineStatus::MusicFailed,
            PipelineStatus::CombinationFailed,
        ]
    }

    /// Position of the status in the forward order of a run.
    pub fn rank(&self) -> u8 {
        match self {
            PipelineStatus::Uploaded => 0,
            PipelineStatus::FramesExtracting => 1,
            PipelineStatus::FramesExtracted | PipelineStatus::FramesFailed => 2,
            PipelineStatus::Analyzing => 3,
            PipelineStatus::Analyzed | PipelineStatus::AnalysisFailed => 4,
            PipelineStatus::GeneratingMusic => 5,
            PipelineStatus::MusicCompleted | PipelineStatus::MusicFailed => 6,
            PipelineStatus::CombiningVideo => 7,
            PipelineStatus::Completed | PipelineStatus::CombinationFailed => 8,
        }
    }

    /// Check if this is a terminal state for the current run.
    ///
    /// `analysis_failed` is not terminal: the run carries on with a
    /// fallback prompt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed
                | PipelineStatus::FramesFailed
                | PipelineStatus::MusicFailed
                | PipelineStatus::CombinationFailed
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PipelineStatus::FramesFailed
                | PipelineStatus::AnalysisFailed
                | PipelineStatus::MusicFailed
                | PipelineStatus::CombinationFailed
        )
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of pipeline work with its own status triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FrameSampling,
    Analysis,
    MusicSynthesis,
    Combination,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::FrameSampling => "frame_sampling",
            PipelineStage::Analysis => "analysis",
            PipelineStage::MusicSynthesis => "music_synthesis",
            PipelineStage::Combination => "combination",
        }
    }

    pub fn all() -> &'static [PipelineStage] {
        &[
            PipelineStage::FrameSampling,
            PipelineStage::Analysis,
            PipelineStage::MusicSynthesis,
            PipelineStage::Combination,
        ]
    }

    /// Status persisted when the stage starts.
    pub fn running_status(&self) -> PipelineStatus {
        match self {
            PipelineStage::FrameSampling => PipelineStatus::FramesExtracting,
            PipelineStage::Analysis => PipelineStatus::Analyzing,
            PipelineStage::MusicSynthesis => PipelineStatus::GeneratingMusic,
            PipelineStage::Combination => PipelineStatus::CombiningVideo,
        }
    }

    /// Status persisted when the stage succeeds.
    pub fn success_status(&self) -> PipelineStatus {
        match self {
            PipelineStage::FrameSampling => PipelineStatus::FramesExtracted,
            PipelineStage::Analysis => PipelineStatus::Analyzed,
            PipelineStage::MusicSynthesis => PipelineStatus::MusicCompleted,
            PipelineStage::Combination => PipelineStatus::Completed,
        }
    }

    /// Status persisted when the stage fails.
    pub fn failure_status(&self) -> PipelineStatus {
        match self {
            PipelineStage::FrameSampling => PipelineStatus::FramesFailed,
            PipelineStage::Analysis => PipelineStatus::AnalysisFailed,
            PipelineStage::MusicSynthesis => PipelineStatus::MusicFailed,
            PipelineStage::Combination => PipelineStatus::CombinationFailed,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Status snapshot returned to callers polling an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusRecord {
    pub video_id: VideoId,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
    pub analysis_used_fallback: bool,
    pub updated_at: DateTime<Utc>,
}
