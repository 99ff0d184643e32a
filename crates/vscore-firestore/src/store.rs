//! Asset store used by the pipeline.
//!
//! [`AssetStore`] is the only persistence seam the orchestrator sees.
//! [`FirestoreAssetStore`] backs it with Firestore documents and
//! [`InMemoryAssetStore`] keeps everything in process for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use vscore_models::{
    FinalArtifact, FrameSet, MediaFacts, MusicGeneration, PipelineStage, PipelineStatus, PromptRecord,
    StatusRecord, VideoAsset, VideoId,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_status_write;
use crate::repos::{collections, RecordRepository, VideoRepository};
use crate::types::{json_to_value, ToFirestoreValue};

/// A status write.
///
/// `detail` and `failed_stage` always overwrite the stored values, so a
/// running status clears a previous failure. The optional flags are only
/// written when set.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: PipelineStatus,
    pub detail: Option<String>,
    pub failed_stage: Option<PipelineStage>,
    pub analysis_used_fallback: Option<bool>,
    pub vision_analysis: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: PipelineStatus) -> Self {
        Self {
            status,
            detail: None,
            failed_stage: None,
            analysis_used_fallback: None,
            vision_analysis: None,
        }
    }

    /// Failure status for `stage` with a human-readable cause.
    pub fn failed(stage: PipelineStage, status: PipelineStatus, detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            failed_stage: Some(stage),
            ..Self::to(status)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_fallback(mut self, used_fallback: bool) -> Self {
        self.analysis_used_fallback = Some(used_fallback);
        self
    }

    pub fn with_vision_analysis(mut self, prompt: impl Into<String>) -> Self {
        self.vision_analysis = Some(prompt.into());
        self
    }

    fn apply(&self, asset: &mut VideoAsset) {
        asset.status = self.status;
        asset.status_detail = self.detail.clone();
        asset.failed_stage = self.failed_stage;
        if let Some(flag) = self.analysis_used_fallback {
            asset.analysis_used_fallback = flag;
        }
        if let Some(prompt) = &self.vision_analysis {
            asset.vision_analysis = Some(prompt.clone());
        }
        asset.updated_at = Utc::now();
    }
}

fn status_record(asset: &VideoAsset) -> StatusRecord {
    StatusRecord {
        video_id: asset.id.clone(),
        status: asset.status,
        detail: asset.status_detail.clone(),
        failed_stage: asset.failed_stage,
        analysis_used_fallback: asset.analysis_used_fallback,
        updated_at: asset.updated_at,
    }
}

/// Persistence for assets and their run records.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_asset(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoAsset>>;

    async fn create_asset(&self, asset: &VideoAsset) -> FirestoreResult<()>;

    async fn update_media_facts(&self, video_id: &VideoId, media: &MediaFacts) -> FirestoreResult<()>;

    async fn set_status(&self, video_id: &VideoId, update: &StatusUpdate) -> FirestoreResult<()>;

    /// Current status snapshot, `None` for unknown assets.
    async fn get_status(&self, video_id: &VideoId) -> FirestoreResult<Option<StatusRecord>> {
        Ok(self.get_asset(video_id).await?.as_ref().map(status_record))
    }

    async fn save_frame_set(&self, frames: &FrameSet) -> FirestoreResult<()>;

    /// Store `record` as the asset's active prompt, superseding the
    /// previously active one.
    async fn activate_prompt(&self, record: &PromptRecord) -> FirestoreResult<()>;

    async fn active_prompt(&self, video_id: &VideoId) -> FirestoreResult<Option<PromptRecord>>;

    /// Insert or replace a generation record.
    async fn save_generation(&self, generation: &MusicGeneration) -> FirestoreResult<()>;

    /// Insert or replace a final artifact record.
    async fn save_artifact(&self, artifact: &FinalArtifact) -> FirestoreResult<()>;
}

/// Firestore-backed asset store.
#[derive(Clone)]
pub struct FirestoreAssetStore {
    videos: VideoRepository,
    frame_sets: RecordRepository,
    prompts: RecordRepository,
    generations: RecordRepository,
    artifacts: RecordRepository,
}

impl FirestoreAssetStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            videos: VideoRepository::new(client.clone()),
            frame_sets: RecordRepository::new(client.clone(), collections::FRAME_SETS),
            prompts: RecordRepository::new(client.clone(), collections::PROMPT_RECORDS),
            generations: RecordRepository::new(client.clone(), collections::MUSIC_GENERATIONS),
            artifacts: RecordRepository::new(client, collections::FINAL_ARTIFACTS),
        }
    }

    pub fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env()?))
    }

    fn missing_asset(video_id: &VideoId) -> FirestoreError {
        FirestoreError::not_found(format!("{}/{}", collections::VIDEOS, video_id))
    }
}

#[async_trait]
impl AssetStore for FirestoreAssetStore {
    async fn get_asset(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoAsset>> {
        self.videos.get(video_id).await
    }

    async fn create_asset(&self, asset: &VideoAsset) -> FirestoreResult<()> {
        self.videos.create(asset).await
    }

    async fn update_media_facts(&self, video_id: &VideoId, media: &MediaFacts) -> FirestoreResult<()> {
        self.videos.update_media(video_id, media).await
    }

    async fn set_status(&self, video_id: &VideoId, update: &StatusUpdate) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), update.status.as_str().to_firestore_value());
        fields.insert("status_detail".to_string(), update.detail.clone().to_firestore_value());
        fields.insert(
            "failed_stage".to_string(),
            json_to_value(serde_json::to_value(update.failed_stage)?),
        );
        if let Some(flag) = update.analysis_used_fallback {
            fields.insert("analysis_used_fallback".to_string(), flag.to_firestore_value());
        }
        if let Some(prompt) = &update.vision_analysis {
            fields.insert("vision_analysis".to_string(), prompt.to_firestore_value());
        }
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        match self.videos.update(video_id, fields).await {
            Err(FirestoreError::NotFound(_)) => Err(Self::missing_asset(video_id)),
            other => other,
        }?;
        record_status_write(update.status);
        debug!(video_id = %video_id, status = %update.status, "Persisted status");
        Ok(())
    }

    async fn save_frame_set(&self, frames: &FrameSet) -> FirestoreResult<()> {
        self.frame_sets.upsert(frames.run_id.as_str(), frames).await
    }

    async fn activate_prompt(&self, record: &PromptRecord) -> FirestoreResult<()> {
        let asset = self
            .videos
            .get(&record.video_id)
            .await?
            .ok_or_else(|| Self::missing_asset(&record.video_id))?;

        self.prompts.insert(record.id.as_str(), record).await?;
        if let Some(previous) = asset.active_prompt_id.filter(|id| *id != record.id) {
            self.prompts.supersede(previous.as_str(), record.created_at).await?;
        }
        self.videos.set_active_prompt(&record.video_id, &record.id).await?;
        info!(video_id = %record.video_id, prompt_id = %record.id, source = record.source.as_str(), "Activated prompt");
        Ok(())
    }

    async fn active_prompt(&self, video_id: &VideoId) -> FirestoreResult<Option<PromptRecord>> {
        let Some(asset) = self.videos.get(video_id).await? else {
            return Ok(None);
        };
        match asset.active_prompt_id {
            Some(id) => self.prompts.get(id.as_str()).await,
            None => Ok(None),
        }
    }

    async fn save_generation(&self, generation: &MusicGeneration) -> FirestoreResult<()> {
        self.generations.upsert(generation.id.as_str(), generation).await
    }

    async fn save_artifact(&self, artifact: &FinalArtifact) -> FirestoreResult<()> {
        self.artifacts.upsert(artifact.id.as_str(), artifact).await
    }
}

#[derive(Default)]
struct MemoryState {
    assets: HashMap<VideoId, VideoAsset>,
    history: HashMap<VideoId, Vec<PipelineStatus>>,
    frame_sets: Vec<FrameSet>,
    prompts: Vec<PromptRecord>,
    generations: Vec<MusicGeneration>,
    artifacts: Vec<FinalArtifact>,
}

/// In-process asset store.
///
/// Records every status write so callers can inspect the exact sequence a
/// run produced.
#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status persisted for the asset, oldest first.
    pub async fn status_history(&self, video_id: &VideoId) -> Vec<PipelineStatus> {
        self.state.read().await.history.get(video_id).cloned().unwrap_or_default()
    }

    pub async fn frame_sets(&self, video_id: &VideoId) -> Vec<FrameSet> {
        let state = self.state.read().await;
        state.frame_sets.iter().filter(|f| f.video_id == *video_id).cloned().collect()
    }

    pub async fn prompts(&self, video_id: &VideoId) -> Vec<PromptRecord> {
        let state = self.state.read().await;
        state.prompts.iter().filter(|p| p.video_id == *video_id).cloned().collect()
    }

    pub async fn generations(&self, video_id: &VideoId) -> Vec<MusicGeneration> {
        let state = self.state.read().await;
        state.generations.iter().filter(|g| g.video_id == *video_id).cloned().collect()
    }

    pub async fn artifacts(&self, video_id: &VideoId) -> Vec<FinalArtifact> {
        let state = self.state.read().await;
        state.artifacts.iter().filter(|a| a.video_id == *video_id).cloned().collect()
    }
}

fn upsert_by<T: Clone, K: PartialEq>(items: &mut Vec<T>, item: &T, key: impl Fn(&T) -> K) {
    let id = key(item);
    match items.iter_mut().find(|existing| key(existing) == id) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get_asset(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoAsset>> {
        Ok(self.state.read().await.assets.get(video_id).cloned())
    }

    async fn create_asset(&self, asset: &VideoAsset) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        if state.assets.contains_key(&asset.id) {
            return Err(FirestoreError::AlreadyExists(format!("{}/{}", collections::VIDEOS, asset.id)));
        }
        state.assets.insert(asset.id.clone(), asset.clone());
        Ok(())
    }

    async fn update_media_facts(&self, video_id: &VideoId, media: &MediaFacts) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        let asset = state
            .assets
            .get_mut(video_id)
            .ok_or_else(|| FirestoreAssetStore::missing_asset(video_id))?;
        asset.media = Some(*media);
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, video_id: &VideoId, update: &StatusUpdate) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        let asset = state
            .assets
            .get_mut(video_id)
            .ok_or_else(|| FirestoreAssetStore::missing_asset(video_id))?;
        update.apply(asset);
        state.history.entry(video_id.clone()).or_default().push(update.status);
        Ok(())
    }

    async fn save_frame_set(&self, frames: &FrameSet) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        upsert_by(&mut state.frame_sets, frames, |f| f.run_id.clone());
        Ok(())
    }

    async fn activate_prompt(&self, record: &PromptRecord) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        let previous = state
            .assets
            .get(&record.video_id)
            .ok_or_else(|| FirestoreAssetStore::missing_asset(&record.video_id))?
            .active_prompt_id
            .clone();

        if state.prompts.iter().any(|p| p.id == record.id) {
            return Err(FirestoreError::AlreadyExists(format!(
                "{}/{}",
                collections::PROMPT_RECORDS,
                record.id
            )));
        }
        if let Some(previous) = previous {
            if let Some(old) = state.prompts.iter_mut().find(|p| p.id == previous) {
                old.supersede(record.created_at);
            }
        }
        state.prompts.push(record.clone());
        if let Some(asset) = state.assets.get_mut(&record.video_id) {
            asset.active_prompt_id = Some(record.id.clone());
            asset.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn active_prompt(&self, video_id: &VideoId) -> FirestoreResult<Option<PromptRecord>> {
        let state = self.state.read().await;
        let active = state
            .assets
            .get(video_id)
            .and_then(|a| a.active_prompt_id.as_ref())
            .and_then(|id| state.prompts.iter().find(|p| p.id == *id))
            .cloned();
        Ok(active)
    }

    async fn save_generation(&self, generation: &MusicGeneration) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        upsert_by(&mut state.generations, generation, |g| g.id.clone());
        Ok(())
    }

    async fn save_artifact(&self, artifact: &FinalArtifact) -> FirestoreResult<()> {
        let mut state = self.state.write().await;
        upsert_by(&mut state.artifacts, artifact, |a| a.id.clone());
        Ok(())
    }
}
