//! Video-to-music pipeline worker.
//!
//! This crate provides:
//! - The run state machine and its transition table
//! - Prompt generation from frames and prompt checking
//! - Music synthesis with a single retry
//! - The orchestrator driving frames, analysis, music and combination
//! - Worker configuration, run logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod prompt_checker;
pub mod prompt_generator;
pub mod retry;
pub mod state_machine;
pub mod synthesizer;
pub mod workspace;

pub use config::{PipelineConfig, StageTimeouts, WorkerConfig};
pub use error::{PipelineError, PipelineResult};
pub use logging::RunLogger;
pub use orchestrator::{Pipeline, PipelineDeps, RunOptions};
pub use prompt_checker::{CheckedPrompt, PromptChecker, DEFAULT_PROMPT_MAX_LENGTH};
pub use prompt_generator::{GeneratedPrompt, PromptGenerator, DEFAULT_VISION_INSTRUCTION};
pub use state_machine::{next_status, RunStateMachine, StageEvent};
pub use synthesizer::{MusicSynthesizer, SynthesisRequest};
pub use workspace::RunWorkspace;
