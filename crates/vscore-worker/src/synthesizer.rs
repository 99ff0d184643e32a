//! Music synthesis stage.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vscore_ai::{wav_duration, GeneratedAudio, MusicGenerator};
use vscore_firestore::AssetStore;
use vscore_models::{MusicGeneration, RunId, VideoId};
use vscore_storage::{music_key, ObjectStore};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_music_attempt;
use crate::retry::{retry_async, RetryConfig};

/// Prompts that went into one synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub video_id: &'a VideoId,
    pub run_id: &'a RunId,
    /// Validated prompt sent to the generator
    pub prompt: &'a str,
    /// Raw vision output, kept for audit
    pub vision_prompt: Option<&'a str>,
    /// User-supplied prompt, when one replaced the vision output
    pub music_prompt: Option<&'a str>,
}

/// Generates, stores and records one music track.
pub struct MusicSynthesizer {
    generator: Arc<dyn MusicGenerator>,
    storage: Arc<dyn ObjectStore>,
    store: Arc<dyn AssetStore>,
    timeout: Duration,
    retry: RetryConfig,
}

impl MusicSynthesizer {
    /// One retry after `retry_backoff`; each call is bounded by `timeout`.
    pub fn new(
        generator: Arc<dyn MusicGenerator>,
        storage: Arc<dyn ObjectStore>,
        store: Arc<dyn AssetStore>,
        timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            generator,
            storage,
            store,
            timeout,
            retry: RetryConfig::new("music_generate")
                .with_max_retries(1)
                .with_base_delay(retry_backoff),
        }
    }

    /// Produce a completed [`MusicGeneration`] or fail with
    /// [`PipelineError::GenerationUnavailable`]. The record is persisted at
    /// every transition, including failure.
    pub async fn synthesize(&self, request: SynthesisRequest<'_>) -> PipelineResult<MusicGeneration> {
        let mut generation = MusicGeneration::pending(
            request.video_id.clone(),
            request.run_id.clone(),
            request.prompt,
        )
        .with_music_prompt(request.music_prompt.map(str::to_string));
        if let Some(raw) = request.vision_prompt {
            generation = generation.with_vision_prompt(raw);
        }
        self.store.save_generation(&generation).await?;

        generation.mark_generating()?;
        self.store.save_generation(&generation).await?;

        match self.produce(&generation, request.prompt).await {
            Ok((locator, duration, size)) => {
                generation.complete(locator, duration, size)?;
                self.store.save_generation(&generation).await?;
                info!(
                    generation_id = %generation.id,
                    duration_secs = duration,
                    size_bytes = size,
                    "Music generation completed"
                );
                Ok(generation)
            }
            Err(message) => {
                warn!(generation_id = %generation.id, "Music generation failed: {}", message);
                generation.fail(message.clone())?;
                self.store.save_generation(&generation).await?;
                Err(PipelineError::generation_unavailable(message))
            }
        }
    }

    /// Generate, upload and read back. Returns locator, measured duration and size.
    async fn produce(&self, generation: &MusicGeneration, prompt: &str) -> Result<(String, f64, u64), String> {
        let audio = self.generate_with_retry(prompt).await?;

        let key = music_key(&generation.video_id, &generation.id);
        let locator = self
            .storage
            .put(audio.bytes, &key, "audio/wav")
            .await
            .map_err(|e| format!("failed to store generated audio: {}", e))?;

        let stored = self
            .storage
            .get(&locator)
            .await
            .map_err(|e| format!("stored audio is not readable: {}", e))?;
        let duration = wav_duration(&stored).map_err(|e| e.to_string())?;
        if duration <= 0.0 {
            return Err("generated audio has zero length".to_string());
        }

        Ok((locator, duration, stored.len() as u64))
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<GeneratedAudio, String> {
        let result = retry_async(&self.retry, || async move {
            record_music_attempt();
            match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
                Ok(Ok(audio)) => Ok(audio),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("music service timed out after {}s", self.timeout.as_secs())),
            }
        })
        .await;

        let attempts = result.attempts();
        result
            .into_result()
            .map_err(|e| format!("{} (after {} attempts)", e, attempts))
    }
}
