//! Object storage for the VScore pipeline.
//!
//! This crate provides:
//! - The [`ObjectStore`] put/get capability
//! - A Cloudflare R2 backend over the S3 API
//! - An in-memory backend for tests and dry runs
//! - The object key layout for videos, frames, music and final renders

pub mod client;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult, TransferOp};
pub use keys::{content_type_for, final_key, frame_key, music_key, video_key, Locator};
pub use memory::MemoryObjectStore;
pub use store::ObjectStore;
