//! Final audio/video artifacts.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::ids::{ArtifactId, MusicGenerationId, RunId, VideoId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Processing => "processing",
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Failed => "failed",
        }
    }

    pub fn can_advance_to(&self, next: ArtifactStatus) -> bool {
        use ArtifactStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The muxed output video of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinalArtifact {
    pub id: ArtifactId,
    pub video_id: VideoId,
    pub run_id: RunId,
    /// Music generation whose audio was used
    pub audio_source_id: MusicGenerationId,
    #[serde(default)]
    pub output_locator: Option<String>,
    #[serde(default)]
    pub output_duration_secs: Option<f64>,
    /// Target duration the output was reconciled to
    pub target_duration_secs: f64,
    /// Reconcile policy label (`unchanged`, `trim`, `loop`, `pad`)
    #[serde(default)]
    pub reconcile_policy: Option<String>,
    /// Number of mux attempts made
    #[serde(default)]
    pub attempts: u32,
    pub status: ArtifactStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FinalArtifact {
    pub fn pending(
        video_id: VideoId,
        run_id: RunId,
        audio_source_id: MusicGenerationId,
        target_duration_secs: f64,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            video_id,
            run_id,
            audio_source_id,
            output_locator: None,
            output_duration_secs: None,
            target_duration_secs,
            reconcile_policy: None,
            attempts: 0,
            status: ArtifactStatus::Pending,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn advance(&mut self, next: ArtifactStatus) -> ModelResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(ModelError::invalid_transition("final_artifact", self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_processing(&mut self, reconcile_policy: impl Into<String>) -> ModelResult<()> {
        self.advance(ArtifactStatus::Processing)?;
        self.reconcile_policy = Some(reconcile_policy.into());
        Ok(())
    }

    pub fn complete(
        &mut self,
        locator: impl Into<String>,
        output_duration_secs: f64,
        attempts: u32,
    ) -> ModelResult<()> {
        let locator = locator.into();
        if locator.is_empty() {
            return Err(ModelError::MissingLocator("final_artifact"));
        }
        self.advance(ArtifactStatus::Completed)?;
        self.output_locator = Some(locator);
        self.output_duration_secs = Some(output_duration_secs);
        self.attempts = attempts;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, attempts: u32) -> ModelResult<()> {
        self.advance(ArtifactStatus::Failed)?;
        self.error = Some(error.into());
        self.attempts = attempts;
        Ok(())
    }

    /// Output duration is within `tolerance` of the target.
    pub fn duration_matches(&self, tolerance: f64) -> bool {
        self.output_duration_secs
            .map(|d| (d - self.target_duration_secs).abs() <= tolerance)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_lifecycle() {
        let mut artifact = FinalArtifact::pending(
            VideoId::from("v"),
            RunId::from("r"),
            MusicGenerationId::from("g"),
            15.0,
        );
        artifact.mark_processing("trim").unwrap();
        artifact.complete("mem://final/v/a.mp4", 15.01, 1).unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Completed);
        assert!(artifact.duration_matches(1.0 / 30.0));
        assert!(!artifact.duration_matches(0.001));
    }

    #[test]
    fn test_failed_artifact_cannot_complete() {
        let mut artifact = FinalArtifact::pending(
            VideoId::from("v"),
            RunId::from("r"),
            MusicGenerationId::from("g"),
            15.0,
        );
        artifact.mark_processing("loop").unwrap();
        artifact.fail("duration mismatch", 2).unwrap();
        tokio_test::assert_err!(artifact.complete("mem://x", 15.0, 2));
        assert_eq!(artifact.attempts, 2);
    }
}
