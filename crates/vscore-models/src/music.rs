//! Music generation attempts.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::ids::{MusicGenerationId, RunId, VideoId};

/// Maximum stored length of the raw vision prompt.
pub const VISION_PROMPT_STORE_LIMIT: usize = 1000;

/// Status of a single generation attempt. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    pub fn can_advance_to(&self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Generating) | (Pending, Failed) | (Generating, Completed) | (Generating, Failed)
        )
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MusicGeneration {
    pub id: MusicGenerationId,
    pub video_id: VideoId,
    pub run_id: RunId,
    /// Validated prompt sent to the music model
    pub prompt: String,
    /// Raw vision prompt, truncated for storage
    #[serde(default)]
    pub vision_prompt: Option<String>,
    /// User-supplied music prompt, if any
    #[serde(default)]
    pub music_prompt: Option<String>,
    #[serde(default)]
    pub audio_locator: Option<String>,
    #[serde(default)]
    pub audio_duration_secs: Option<f64>,
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
    pub status: GenerationStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MusicGeneration {
    pub fn pending(video_id: VideoId, run_id: RunId, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MusicGenerationId::new(),
            video_id,
            run_id,
            prompt: prompt.into(),
            vision_prompt: None,
            music_prompt: None,
            audio_locator: None,
            audio_duration_secs: None,
            file_size_bytes: None,
            status: GenerationStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_vision_prompt(mut self, raw: &str) -> Self {
        self.vision_prompt = Some(raw.chars().take(VISION_PROMPT_STORE_LIMIT).collect());
        self
    }

    pub fn with_music_prompt(mut self, prompt: Option<String>) -> Self {
        self.music_prompt = prompt;
        self
    }

    fn advance(&mut self, next: GenerationStatus) -> ModelResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(ModelError::invalid_transition(
                "music_generation",
                self.status,
                next,
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_generating(&mut self) -> ModelResult<()> {
        self.advance(GenerationStatus::Generating)
    }

    /// Complete the attempt. The locator must be non-empty.
    pub fn complete(
        &mut self,
        locator: impl Into<String>,
        duration_secs: f64,
        size_bytes: u64,
    ) -> ModelResult<()> {
        let locator = locator.into();
        if locator.is_empty() {
            return Err(ModelError::MissingLocator("music_generation"));
        }
        self.advance(GenerationStatus::Completed)?;
        self.audio_locator = Some(locator);
        self.audio_duration_secs = Some(duration_secs);
        self.file_size_bytes = Some(size_bytes);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.advance(GenerationStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation() -> MusicGeneration {
        MusicGeneration::pending(VideoId::from("v"), RunId::from("r"), "Ambient piano.")
    }

    #[test]
    fn test_happy_path() {
        let mut gen = generation();
        gen.mark_generating().unwrap();
        gen.complete("mem://music/v/g.wav", 12.5, 1024).unwrap();
        assert_eq!(gen.status, GenerationStatus::Completed);
        assert_eq!(gen.audio_duration_secs, Some(12.5));
        assert!(gen.completed_at.is_some());
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut gen = generation();
        gen.mark_generating().unwrap();
        gen.fail("timeout").unwrap();
        assert!(gen.mark_generating().is_err());
        assert!(gen.complete("mem://x", 1.0, 1).is_err());
        assert_eq!(gen.status, GenerationStatus::Failed);
    }

    #[test]
    fn test_complete_requires_locator() {
        let mut gen = generation();
        gen.mark_generating().unwrap();
        assert_eq!(
            gen.complete("", 1.0, 1),
            Err(ModelError::MissingLocator("music_generation"))
        );
        assert_eq!(gen.status, GenerationStatus::Generating);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut gen = generation();
        assert!(gen.complete("mem://x", 1.0, 1).is_err());
    }

    #[test]
    fn test_vision_prompt_is_truncated() {
        let long = "a".repeat(VISION_PROMPT_STORE_LIMIT + 50);
        let gen = generation().with_vision_prompt(&long);
        assert_eq!(
            gen.vision_prompt.map(|p| p.len()),
            Some(VISION_PROMPT_STORE_LIMIT)
        );
    }
}
