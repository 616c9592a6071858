use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{MediaStore, MediaStoreError};

/// Local filesystem media store for development, testing, and single-host
/// deployments. Keys may contain `/` separators; parent directories are
/// created on demand.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl MediaStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        data: Bytes,
    ) -> Result<(), MediaStoreError> {
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, MediaStoreError> {
        let path = self.blob_path(key);
        if !path.exists() {
            return Err(MediaStoreError::NotFound(key.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        let path = self.blob_path(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, MediaStoreError> {
        let path = self.blob_path(key);
        Ok(path.exists())
    }
}
