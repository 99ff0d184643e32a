//! Firestore persistence for VScore.
//!
//! Provides a REST client with token caching and retries, typed
//! repositories, and the [`AssetStore`] abstraction the pipeline writes
//! statuses and run records through.

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{collections, RecordRepository, VideoRepository};
pub use retry::RetryConfig;
pub use store::{AssetStore, FirestoreAssetStore, InMemoryAssetStore, StatusUpdate};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
