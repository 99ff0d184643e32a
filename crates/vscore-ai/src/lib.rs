//! Model clients for VScore.
//!
//! - [`VisionAnalyzer`]: frames + instruction to text (Groq)
//! - [`MusicGenerator`]: prompt to WAV audio (Vertex AI Lyria)
//! - Scripted fakes for dry runs and tests

pub mod error;
pub mod fakes;
pub mod metrics;
pub mod music;
pub mod vision;

pub use error::{AiError, AiResult};
pub use fakes::{ScriptedMusicGenerator, ScriptedVisionAnalyzer};
pub use music::{silent_wav, wav_duration, GeneratedAudio, LyriaClient, LyriaConfig, MusicGenerator};
pub use vision::{GroqConfig, GroqVisionClient, VisionAnalyzer};
