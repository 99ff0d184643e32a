//! Frames to raw music prompt via the vision model.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vscore_ai::VisionAnalyzer;
use vscore_models::encoding::FALLBACK_PROMPT;

use crate::error::PipelineError;

/// Default instruction sent with the frames.
pub const DEFAULT_VISION_INSTRUCTION: &str = r#"Analyze these video frames and generate a detailed, specific prompt for background music generation using Lyria. Follow the Lyria music generation prompt guide format.

Focus on:
- Visual mood and atmosphere
- Movement and energy in the scene
- Color palette and lighting
- Emotional tone
- Suitable music style and instruments

Generate ONLY the music prompt, no additional text or explanations.

Example format: "Dark Hybrid Film Score, Los Angeles, Studio recording, ominous and relentless. Pristine contemporary Instrumental, recorded live London, Dark Trailer Music. A blend of driving percussive synths, distorted orchestral elements, and filmic pulse textures, with instruments such as synths, distorted strings, brass, and hybrid percussion, and a cinematic approach, featuring pulsing rhythms, dissonant harmonies, and a sense of impending dread, evoking a tense and foreboding atmosphere""#;

/// Labels models like to put in front of the answer.
const ANSWER_LABELS: &[&str] = &["music prompt:", "prompt:"];

/// Raw prompt for one run.
#[derive(Debug)]
pub struct GeneratedPrompt {
    pub text: String,
    pub used_fallback: bool,
    /// Why the fallback was used
    pub cause: Option<PipelineError>,
}

impl GeneratedPrompt {
    fn fallback(cause: PipelineError) -> Self {
        Self {
            text: FALLBACK_PROMPT.to_string(),
            used_fallback: true,
            cause: Some(cause),
        }
    }
}

/// Turns sampled frames into a raw music prompt.
///
/// Never fails: any problem with the vision call yields the fallback prompt.
pub struct PromptGenerator {
    vision: Arc<dyn VisionAnalyzer>,
    instruction: String,
    timeout: Duration,
    max_response_chars: usize,
}

impl PromptGenerator {
    /// `max_prompt_length` is the checker's limit; responses over four
    /// times that are treated as malformed.
    pub fn new(vision: Arc<dyn VisionAnalyzer>, timeout: Duration, max_prompt_length: usize) -> Self {
        Self {
            vision,
            instruction: DEFAULT_VISION_INSTRUCTION.to_string(),
            timeout,
            max_response_chars: max_prompt_length.saturating_mul(4),
        }
    }

    pub async fn generate(&self, frames: &[Vec<u8>], instruction_override: Option<&str>) -> GeneratedPrompt {
        if frames.is_empty() {
            warn!("No frames available for analysis; using fallback prompt");
            return GeneratedPrompt::fallback(PipelineError::AnalysisUnavailable(
                "no frames to analyze".to_string(),
            ));
        }

        let instruction = instruction_override
            .filter(|i| !i.trim().is_empty())
            .unwrap_or(self.instruction.as_str());

        let reply = match tokio::time::timeout(self.timeout, self.vision.analyze(frames, instruction)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Vision analysis failed: {}", e);
                return GeneratedPrompt::fallback(PipelineError::AnalysisUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!("Vision analysis timed out after {:?}", self.timeout);
                return GeneratedPrompt::fallback(PipelineError::AnalysisUnavailable(format!(
                    "vision call timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        match clean_reply(&reply, self.max_response_chars) {
            Ok(text) => {
                info!(chars = text.chars().count(), frames = frames.len(), "Raw music prompt generated");
                GeneratedPrompt {
                    text,
                    used_fallback: false,
                    cause: None,
                }
            }
            Err(reason) => {
                warn!("Malformed vision response: {}", reason);
                GeneratedPrompt::fallback(PipelineError::AnalysisUnavailable(reason))
            }
        }
    }
}

/// Strip quotes and answer labels; reject empty or oversized replies.
fn clean_reply(reply: &str, max_chars: usize) -> Result<String, String> {
    let mut text = reply.trim();

    for label in ANSWER_LABELS {
        if text.len() >= label.len()
            && text.is_char_boundary(label.len())
            && text[..label.len()].eq_ignore_ascii_case(label)
        {
            text = text[label.len()..].trim_start();
            break;
        }
    }

    let text = text
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '\u{201c}' || c == '\u{201d}')
        .trim();

    if text.is_empty() {
        return Err("empty response".to_string());
    }
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(format!("response has {} characters, limit is {}", chars, max_chars));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscore_ai::ScriptedVisionAnalyzer;

    fn frames() -> Vec<Vec<u8>> {
        vec![vec![0xFF, 0xD8, 0xFF], vec![0xFF, 0xD8, 0xFF]]
    }

    fn generator(vision: Arc<ScriptedVisionAnalyzer>) -> PromptGenerator {
        PromptGenerator::new(vision, Duration::from_millis(200), 500)
    }

    #[tokio::test]
    async fn test_returns_cleaned_reply() {
        let vision = Arc::new(ScriptedVisionAnalyzer::responding(
            "Music prompt: \"Warm acoustic folk, guitar and violin.\"",
        ));
        let prompt = generator(vision.clone()).generate(&frames(), None).await;
        assert!(!prompt.used_fallback);
        assert_eq!(prompt.text, "Warm acoustic folk, guitar and violin.");
        assert_eq!(vision.last_instruction().as_deref(), Some(DEFAULT_VISION_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_instruction_override() {
        let vision = Arc::new(ScriptedVisionAnalyzer::responding("Lo-fi hip hop."));
        generator(vision.clone()).generate(&frames(), Some("Describe as lo-fi")).await;
        assert_eq!(vision.last_instruction().as_deref(), Some("Describe as lo-fi"));
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let vision = Arc::new(ScriptedVisionAnalyzer::failing("503"));
        let prompt = generator(vision).generate(&frames(), None).await;
        assert!(prompt.used_fallback);
        assert_eq!(prompt.text, FALLBACK_PROMPT);
        assert!(matches!(prompt.cause, Some(PipelineError::AnalysisUnavailable(_))));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let vision = Arc::new(ScriptedVisionAnalyzer::responding("late").with_delay(Duration::from_secs(5)));
        let prompt = generator(vision).generate(&frames(), None).await;
        assert!(prompt.used_fallback);
    }

    #[tokio::test]
    async fn test_no_frames_skips_model() {
        let vision = Arc::new(ScriptedVisionAnalyzer::responding("unused"));
        let prompt = generator(vision.clone()).generate(&[], None).await;
        assert!(prompt.used_fallback);
        assert_eq!(vision.calls(), 0);
    }

    #[test]
    fn test_malformed_replies() {
        assert!(clean_reply("   ", 100).is_err());
        assert!(clean_reply("\"\"", 100).is_err());
        assert!(clean_reply(&"a".repeat(101), 100).is_err());
        assert_eq!(clean_reply("PROMPT: Jazz trio", 100).unwrap(), "Jazz trio");
    }
}
