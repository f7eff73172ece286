use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::StorageError;

/// On-disk envelope. `seq` preserves the collection's iteration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredDocument<T> {
    pub seq: u64,
    pub body: T,
}

/// Write-through file store: one JSON file per document,
/// `<base>/<collection>/<id>.json`.
#[derive(Debug)]
pub struct PersistenceManager {
    base_path: PathBuf,
}

impl PersistenceManager {
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            let path = base_path.display();
            StorageError::Persistence(format!("Failed to create {}: {}", path, e))
        })?;
        Ok(PersistenceManager { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub(crate) async fn prepare_collection(&self, collection: &str) -> Result<(), StorageError> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::Persistence(format!("Failed to create {}: {}", dir.display(), e))
        })
    }

    /// Save a document, replacing any previous version atomically.
    pub(crate) async fn save<T: Serialize>(
        &self,
        collection: &str,
        id: Uuid,
        document: &StoredDocument<T>,
    ) -> Result<(), StorageError> {
        let path = self.document_path(collection, id);
        let serialized = serde_json::to_vec(document)
            .map_err(|e| StorageError::Persistence(format!("Serialization failed: {}", e)))?;

        // Write to a temporary file first
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to create file: {}", e)))?;

        file.write_all(&serialized)
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to write data: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to sync data: {}", e)))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to rename file: {}", e)))?;

        debug!(collection, %id, bytes = serialized.len(), "document persisted");
        Ok(())
    }

    pub(crate) async fn delete(&self, collection: &str, id: Uuid) -> Result<(), StorageError> {
        match fs::remove_file(self.document_path(collection, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Persistence(format!("Failed to remove document: {}", e))),
        }
    }

    /// Load every document of a collection, ordered by sequence number.
    pub(crate) async fn load_all<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<StoredDocument<T>>, StorageError> {
        let dir = self.collection_dir(collection);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            StorageError::Persistence(format!("Failed to read {}: {}", dir.display(), e))
        })?;

        let mut documents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| {
                StorageError::Persistence(format!("Failed to read directory entry: {}", e))
            })?
        {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => {}
                Some("tmp") => {
                    // Left behind by an interrupted save; the previous version is intact.
                    warn!(path = %path.display(), "ignoring incomplete document write");
                    continue;
                }
                _ => continue,
            }

            let buffer = fs::read(&path).await.map_err(|e| {
                StorageError::Persistence(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let document: StoredDocument<T> = serde_json::from_slice(&buffer)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))?;
            documents.push(document);
        }

        documents.sort_by_key(|d| d.seq);
        Ok(documents)
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.base_path.join(collection)
    }

    fn document_path(&self, collection: &str, id: Uuid) -> PathBuf {
        self.collection_dir(collection).join(format!("{}.json", id))
    }
}
