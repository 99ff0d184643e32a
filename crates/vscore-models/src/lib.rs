//! Shared data models for the VScore pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video assets and their trim windows
//! - Pipeline status and stages
//! - Frame sets, prompt records, music generations, final artifacts
//! - Encoding defaults shared by the media layer

pub mod artifact;
pub mod encoding;
pub mod error;
pub mod frames;
pub mod ids;
pub mod music;
pub mod prompt;
pub mod status;
pub mod video;

// Re-export common types
pub use artifact::{ArtifactStatus, FinalArtifact};
pub use error::{ModelError, ModelResult};
pub use frames::{FrameRef, FrameSet};
pub use ids::{ArtifactId, MusicGenerationId, PromptRecordId, RunId, VideoId};
pub use music::{GenerationStatus, MusicGeneration};
pub use prompt::{PromptRecord, PromptSource};
pub use status::{PipelineStage, PipelineStatus, StatusRecord};
pub use video::{MediaFacts, Resolution, TrimWindow, VideoAsset};
