//! Filesystem-backed blob store.

use crate::storage::error::StorageError;
use crate::storage::BlobStore;
use async_trait::async_trait;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::{fs, task};

/// Stores each blob as one file under the datastore root.
///
/// Writes are staged to a temp file in the same directory and persisted over
/// the final name, so `exists` never observes a partially written blob.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root)
            .await
            .map_err(|e| StorageError::RootCreation(root.to_path_buf(), e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match fs::metadata(self.root.join(key)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(key.to_string(), e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let root = self.root.clone();
        let path = self.root.join(key);
        let key = key.to_string();

        task::spawn_blocking(move || {
            // Staging in the root keeps the final rename on one filesystem.
            let mut staged =
                NamedTempFile::new_in(&root).map_err(|e| StorageError::Io(key.clone(), e))?;
            staged
                .write_all(&bytes)
                .map_err(|e| StorageError::Io(key.clone(), e))?;
            staged
                .flush()
                .map_err(|e| StorageError::Io(key.clone(), e))?;
            staged
                .persist(&path)
                .map_err(|e| StorageError::Persist(key, e.error))?;
            Ok(())
        })
        .await?
    }
}
