//! Pipeline error types.

use thiserror::Error;
use vscore_models::{PipelineStage, VideoId};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("Frame extraction failed: {0}")]
    ExtractionFailed(String),

    /// Vision analysis failed; the run continues with a fallback prompt.
    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    /// Prompt needed sanitization; the run continues with the cleaned prompt.
    #[error("Prompt invalid: {0}")]
    PromptInvalid(String),

    #[error("Music generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Invalid target duration: {0}")]
    InvalidTargetDuration(f64),

    #[error("Combination failed: {0}")]
    CombinationFailed(String),

    #[error("{stage} timed out after {secs}s")]
    StageTimeout { stage: &'static str, secs: u64 },

    #[error("Video asset not found: {0}")]
    AssetNotFound(VideoId),

    #[error("A run is already in progress for {0}")]
    RunInProgress(VideoId),

    #[error("{stage} failed: {cause}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        cause: Box<PipelineError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid state: {0}")]
    Model(#[from] vscore_models::ModelError),

    #[error("Storage error: {0}")]
    Storage(#[from] vscore_storage::StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] vscore_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(vscore_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<vscore_media::MediaError> for PipelineError {
    fn from(err: vscore_media::MediaError) -> Self {
        use vscore_media::MediaError;
        match err {
            MediaError::UnreadableMedia(msg) => Self::UnreadableMedia(msg),
            e @ MediaError::ExtractionFailed { .. } => Self::ExtractionFailed(e.to_string()),
            MediaError::InvalidTargetDuration(v) => Self::InvalidTargetDuration(v),
            e @ MediaError::CombinationFailed { .. } => Self::CombinationFailed(e.to_string()),
            other => Self::Media(other),
        }
    }
}

impl PipelineError {
    pub fn generation_unavailable(msg: impl Into<String>) -> Self {
        Self::GenerationUnavailable(msg.into())
    }

    pub fn combination_failed(msg: impl Into<String>) -> Self {
        Self::CombinationFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn timeout(stage: &'static str, duration: std::time::Duration) -> Self {
        Self::StageTimeout {
            stage,
            secs: duration.as_secs(),
        }
    }

    /// Attach the stage that produced this error.
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            already @ PipelineError::StageFailed { .. } => already,
            cause => PipelineError::StageFailed {
                stage,
                cause: Box::new(cause),
            },
        }
    }

    /// Stage the error was raised in, if known.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Error without its stage wrapper.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::StageFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Errors absorbed by the pipeline with a substitute value.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            PipelineError::AnalysisUnavailable(_) | PipelineError::PromptInvalid(_)
        )
    }

    /// Errors that end the run.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable() && !matches!(self, PipelineError::RunInProgress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscore_media::MediaError;

    #[test]
    fn test_media_errors_map_to_taxonomy() {
        let err: PipelineError = MediaError::unreadable("no video stream").into();
        assert!(matches!(err, PipelineError::UnreadableMedia(_)));

        let err: PipelineError = MediaError::InvalidTargetDuration(0.0).into();
        assert!(matches!(err, PipelineError::InvalidTargetDuration(_)));

        let err: PipelineError = MediaError::combination_failed(2, "duration drift").into();
        assert!(matches!(err, PipelineError::CombinationFailed(_)));

        let err: PipelineError = MediaError::Timeout(5).into();
        assert!(matches!(err, PipelineError::Media(_)));
    }

    #[test]
    fn test_stage_wrapping() {
        let err = PipelineError::generation_unavailable("timeout").in_stage(PipelineStage::MusicSynthesis);
        assert_eq!(err.stage(), Some(PipelineStage::MusicSynthesis));
        assert!(matches!(err.root_cause(), PipelineError::GenerationUnavailable(_)));
        assert!(err.is_fatal());

        let rewrapped = err.in_stage(PipelineStage::Combination);
        assert_eq!(rewrapped.stage(), Some(PipelineStage::MusicSynthesis));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(PipelineError::AnalysisUnavailable("x".into()).is_recoverable());
        assert!(PipelineError::PromptInvalid("x".into()).is_recoverable());
        assert!(!PipelineError::RunInProgress(VideoId::from("v")).is_fatal());
    }
}
