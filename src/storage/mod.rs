//! Durable blob storage for fetched pages, completion markers and the raw
//! locations listing.

pub mod archive;
pub mod error;
pub mod fs;

use crate::storage::error::StorageError;
use async_trait::async_trait;

/// A key-value blob store. Existence of a key is the unit of idempotent skip:
/// implementations must guarantee that a blob is only visible once fully
/// written, so a half-written page is never mistaken for a finished download.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Stores `bytes` under `key`, replacing any previous blob atomically.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}
