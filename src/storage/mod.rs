//! Document store
//!
//! Handles the fundamental storage operations including:
//! - Collections of documents kept in natural (insertion) order
//! - Atomic single-document read-modify-write
//! - Unique-key enforcement
//! - Optional write-through persistence to disk

mod collection;
mod persistence;

pub use collection::Collection;
pub use persistence::PersistenceManager;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::{Patient, UserAccount};

/// A record type that can live in a [`Collection`].
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;

    /// Value that must be unique across the collection, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no document {id} in {collection}")]
    NotFound { collection: &'static str, id: Uuid },

    #[error("duplicate id {id} in {collection}")]
    DuplicateId { collection: &'static str, id: Uuid },

    #[error("duplicate key {key} in {collection}")]
    DuplicateKey { collection: &'static str, key: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),
}

/// Process-wide store handle. Share it behind an `Arc`.
#[derive(Debug)]
pub struct StorageEngine {
    patients: Collection<Patient>,
    users: Collection<UserAccount>,
}

impl StorageEngine {
    pub fn in_memory() -> Self {
        StorageEngine {
            patients: Collection::in_memory(),
            users: Collection::in_memory(),
        }
    }

    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let Some(path) = &config.path else {
            info!("storage running in memory only");
            return Ok(StorageEngine::in_memory());
        };

        let persistence = Arc::new(PersistenceManager::new(path).await?);
        let engine = StorageEngine {
            patients: Collection::persistent(Arc::clone(&persistence)).await?,
            users: Collection::persistent(Arc::clone(&persistence)).await?,
        };
        info!(
            path = %persistence.base_path().display(),
            patients = engine.patients.count().await,
            users = engine.users.count().await,
            "storage opened"
        );
        Ok(engine)
    }

    pub fn patients(&self) -> &Collection<Patient> {
        &self.patients
    }

    pub fn users(&self) -> &Collection<UserAccount> {
        &self.users
    }
}
