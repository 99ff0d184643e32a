//! Music prompt records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{PromptRecordId, RunId, VideoId};

/// Where a raw prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PromptSource {
    VisionModel,
    UserOverride,
}

impl PromptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptSource::VisionModel => "vision-model",
            PromptSource::UserOverride => "user-override",
        }
    }
}

/// A prompt produced for one run.
///
/// At most one record per asset is active. Superseded records are kept
/// for audit and only gain a `superseded_at` timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptRecord {
    pub id: PromptRecordId,
    pub video_id: VideoId,
    pub run_id: RunId,
    pub raw_prompt: String,
    pub validated_prompt: String,
    pub source: PromptSource,
    /// The raw prompt is the deterministic fallback
    #[serde(default)]
    pub used_fallback: bool,
    /// Checker findings
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub superseded_at: Option<DateTime<Utc>>,
}

impl PromptRecord {
    pub fn new(
        video_id: VideoId,
        run_id: RunId,
        raw_prompt: impl Into<String>,
        validated_prompt: impl Into<String>,
        source: PromptSource,
    ) -> Self {
        Self {
            id: PromptRecordId::new(),
            video_id,
            run_id,
            raw_prompt: raw_prompt.into(),
            validated_prompt: validated_prompt.into(),
            source,
            used_fallback: false,
            issues: Vec::new(),
            active: true,
            created_at: Utc::now(),
            superseded_at: None,
        }
    }

    pub fn with_fallback(mut self, used_fallback: bool) -> Self {
        self.used_fallback = used_fallback;
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    /// Mark this record as replaced by a newer one.
    pub fn supersede(&mut self, at: DateTime<Utc>) {
        if self.active {
            self.active = false;
            self.superseded_at = Some(at);
        }
    }
}
