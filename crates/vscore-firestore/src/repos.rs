//! Typed repositories for assets and run records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use vscore_models::{MediaFacts, PromptRecordId, VideoAsset, VideoId};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_upsert;
use crate::types::{decode_document, encode_fields, json_to_value, ToFirestoreValue, Value};

/// Collection names.
pub mod collections {
    pub const VIDEOS: &str = "videos";
    pub const FRAME_SETS: &str = "frame_sets";
    pub const PROMPT_RECORDS: &str = "prompt_records";
    pub const MUSIC_GENERATIONS: &str = "music_generations";
    pub const FINAL_ARTIFACTS: &str = "final_artifacts";
}

fn to_value<T: Serialize>(value: &T) -> FirestoreResult<Value> {
    Ok(json_to_value(serde_json::to_value(value)?))
}

/// Repository for video asset documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Get an asset by ID.
    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<VideoAsset>> {
        match self.client.get_document(collections::VIDEOS, video_id.as_str()).await? {
            Some(doc) => Ok(Some(decode_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Create a new asset record.
    pub async fn create(&self, asset: &VideoAsset) -> FirestoreResult<()> {
        self.client
            .create_document(collections::VIDEOS, asset.id.as_str(), encode_fields(asset)?)
            .await?;
        info!("Created video record: {}", asset.id);
        Ok(())
    }

    /// Store probed media facts.
    pub async fn update_media(&self, video_id: &VideoId, media: &MediaFacts) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("media".to_string(), to_value(media)?);
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        self.update(video_id, fields).await
    }

    /// Point the asset at its currently active prompt record.
    pub async fn set_active_prompt(&self, video_id: &VideoId, prompt_id: &PromptRecordId) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("active_prompt_id".to_string(), prompt_id.as_str().to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        self.update(video_id, fields).await
    }

    /// Update the given fields; the asset must exist.
    pub async fn update(&self, video_id: &VideoId, fields: HashMap<String, Value>) -> FirestoreResult<()> {
        self.client
            .update_fields(collections::VIDEOS, video_id.as_str(), fields)
            .await?;
        Ok(())
    }
}

/// Repository for per-run records keyed by their own id.
#[derive(Clone)]
pub struct RecordRepository {
    client: FirestoreClient,
    collection: &'static str,
}

impl RecordRepository {
    pub fn new(client: FirestoreClient, collection: &'static str) -> Self {
        Self { client, collection }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> FirestoreResult<Option<T>> {
        match self.client.get_document(self.collection, id).await? {
            Some(doc) => Ok(Some(decode_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Insert a record that must not exist yet.
    pub async fn insert<T: Serialize>(&self, id: &str, record: &T) -> FirestoreResult<()> {
        self.client
            .create_document(self.collection, id, encode_fields(record)?)
            .await?;
        debug!(collection = self.collection, id, "Inserted record");
        Ok(())
    }

    /// Write a record, replacing any previous version.
    pub async fn upsert<T: Serialize>(&self, id: &str, record: &T) -> FirestoreResult<()> {
        self.client
            .set_document(self.collection, id, encode_fields(record)?)
            .await?;
        record_upsert(self.collection);
        Ok(())
    }

    /// Mark a prompt record inactive.
    pub async fn supersede(&self, id: &str, at: DateTime<Utc>) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("active".to_string(), false.to_firestore_value());
        fields.insert("superseded_at".to_string(), at.to_firestore_value());
        match self.client.update_fields(self.collection, id, fields).await {
            Ok(_) => Ok(()),
            // Nothing to supersede.
            Err(FirestoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
