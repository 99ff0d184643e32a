//! Object key layout and locator parsing.
//!
//! ```text
//! videos/{video_id}/{filename}
//! frames/{video_id}/{run_id}/frame_{index}.jpg
//! music/{video_id}/{generation_id}.wav
//! final/{video_id}/{artifact_id}.mp4
//! ```

use vscore_models::{ArtifactId, MusicGenerationId, RunId, VideoId};

use crate::error::{StorageError, StorageResult};

pub const R2_SCHEME: &str = "r2://";
pub const MEMORY_SCHEME: &str = "mem://";

pub fn video_key(video_id: &VideoId, filename: &str) -> String {
    format!("videos/{}/{}", video_id, filename)
}

pub fn frame_key(video_id: &VideoId, run_id: &RunId, index: u32) -> String {
    format!("frames/{}/{}/frame_{:03}.jpg", video_id, run_id, index)
}

pub fn music_key(video_id: &VideoId, generation_id: &MusicGenerationId) -> String {
    format!("music/{}/{}.wav", video_id, generation_id)
}

pub fn final_key(video_id: &VideoId, artifact_id: &ArtifactId) -> String {
    format!("final/{}/{}.mp4", video_id, artifact_id)
}

/// A parsed storage locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator<'a> {
    R2 { bucket: &'a str, key: &'a str },
    Memory { key: &'a str },
    /// Bare object key
    Key(&'a str),
}

impl<'a> Locator<'a> {
    pub fn parse(locator: &'a str) -> StorageResult<Self> {
        if let Some(rest) = locator.strip_prefix(R2_SCHEME) {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or_else(|| StorageError::invalid_locator(locator))?;
            return Ok(Locator::R2 { bucket, key });
        }
        if let Some(key) = locator.strip_prefix(MEMORY_SCHEME) {
            if key.is_empty() {
                return Err(StorageError::invalid_locator(locator));
            }
            return Ok(Locator::Memory { key });
        }
        if locator.is_empty() || locator.contains("://") {
            return Err(StorageError::invalid_locator(locator));
        }
        Ok(Locator::Key(locator))
    }

    pub fn key(&self) -> &'a str {
        match self {
            Locator::R2 { key, .. } | Locator::Memory { key } | Locator::Key(key) => key,
        }
    }
}

/// Content type for a key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "mov" => "video/quicktime",
        Some(ext) if ext == "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}
