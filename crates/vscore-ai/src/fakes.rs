//! Deterministic stand-ins for the model clients.
//!
//! Used by the worker's dry-run mode and by pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AiError, AiResult};
use crate::music::{silent_wav, GeneratedAudio, MusicGenerator};
use crate::vision::VisionAnalyzer;

/// Sample rate of the WAVs produced by [`ScriptedMusicGenerator`].
pub const SCRIPTED_SAMPLE_RATE: u32 = 8000;

/// Vision analyzer returning a fixed answer.
pub struct ScriptedVisionAnalyzer {
    reply: Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_instruction: Mutex<Option<String>>,
}

impl ScriptedVisionAnalyzer {
    pub fn responding(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            delay: None,
            calls: AtomicUsize::new(0),
            last_instruction: Mutex::new(None),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            ..Self::responding("")
        }
    }

    /// Sleep before answering, e.g. to exceed a stage timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_instruction(&self) -> Option<String> {
        self.last_instruction.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl VisionAnalyzer for ScriptedVisionAnalyzer {
    async fn analyze(&self, _images: &[Vec<u8>], instruction: &str) -> AiResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_instruction.lock() {
            *last = Some(instruction.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(AiError::unavailable)
    }
}

/// Music generator producing silent WAVs of a scripted length.
///
/// Queued failures are returned first, one per call.
pub struct ScriptedMusicGenerator {
    duration_secs: f64,
    failures: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedMusicGenerator {
    pub fn producing(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` calls as unavailable.
    pub fn with_failures(self, count: usize) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.extend((0..count).map(|i| format!("scripted outage #{}", i + 1)));
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MusicGenerator for ScriptedMusicGenerator {
    async fn generate(&self, _prompt: &str) -> AiResult<GeneratedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().ok().and_then(|mut f| f.pop_front());
        if let Some(message) = failure {
            return Err(AiError::unavailable(message));
        }
        GeneratedAudio::from_wav(silent_wav(self.duration_secs, SCRIPTED_SAMPLE_RATE)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_come_first() {
        let generator = ScriptedMusicGenerator::producing(3.0).with_failures(1);
        assert!(generator.generate("p").await.is_err());
        let audio = generator.generate("p").await.unwrap();
        assert!((audio.duration_secs - 3.0).abs() < 1e-9);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_vision_records_instruction() {
        let vision = ScriptedVisionAnalyzer::responding("Lo-fi beats.");
        assert_eq!(vision.analyze(&[], "describe").await.unwrap(), "Lo-fi beats.");
        assert_eq!(vision.last_instruction().as_deref(), Some("describe"));

        let failing = ScriptedVisionAnalyzer::failing("down");
        assert!(failing.analyze(&[], "describe").await.is_err());
    }
}
