mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Media object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over the binary storage behind image galleries. Keys are the
/// opaque `storage_path` values held by image records; the blobs are
/// meaningless without the metadata rows.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store a blob under `key`. `content_type` is advisory; backends may
    /// record it so the blob can be served with the right type elsewhere.
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<(), MediaStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, MediaStoreError>;
    /// Delete the blob under `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, MediaStoreError>;
}
