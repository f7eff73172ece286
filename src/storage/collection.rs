use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::persistence::{PersistenceManager, StoredDocument};
use super::{Document, StorageError};

#[derive(Debug)]
struct State<T> {
    docs: HashMap<Uuid, StoredDocument<T>>,
    // seq -> id, gives the natural iteration order
    order: BTreeMap<u64, Uuid>,
    // unique key -> id
    keys: HashMap<String, Uuid>,
    next_seq: u64,
}

impl<T: Document> State<T> {
    fn new() -> Self {
        State {
            docs: HashMap::new(),
            order: BTreeMap::new(),
            keys: HashMap::new(),
            next_seq: 0,
        }
    }

    fn key_taken(&self, key: &str, except: Option<Uuid>) -> bool {
        match self.keys.get(key) {
            Some(owner) => Some(*owner) != except,
            None => false,
        }
    }

    fn commit(&mut self, stored: StoredDocument<T>) {
        let id = stored.body.id();
        if let Some(previous) = self.docs.get(&id) {
            if let Some(key) = previous.body.unique_key() {
                self.keys.remove(&key);
            }
        }
        if let Some(key) = stored.body.unique_key() {
            self.keys.insert(key, id);
        }
        self.order.insert(stored.seq, id);
        self.next_seq = self.next_seq.max(stored.seq + 1);
        self.docs.insert(id, stored);
    }
}

/// A set of documents of one type with atomic single-document updates.
///
/// All writers take the collection write lock for the whole
/// resolve -> mutate -> persist sequence, so a mutation always applies to the
/// current version and concurrent writers to the same document serialize.
#[derive(Debug)]
pub struct Collection<T: Document> {
    state: RwLock<State<T>>,
    persistence: Option<Arc<PersistenceManager>>,
}

impl<T: Document> Collection<T> {
    pub fn in_memory() -> Self {
        Collection {
            state: RwLock::new(State::new()),
            persistence: None,
        }
    }

    /// Open a collection backed by `persistence`, loading what is on disk.
    pub async fn persistent(persistence: Arc<PersistenceManager>) -> Result<Self, StorageError> {
        persistence.prepare_collection(T::COLLECTION).await?;
        let mut state = State::new();
        for stored in persistence.load_all::<T>(T::COLLECTION).await? {
            if let Some(key) = stored.body.unique_key() {
                if state.key_taken(&key, Some(stored.body.id())) {
                    return Err(StorageError::Corrupt(format!(
                        "duplicate key {} in collection {}",
                        key,
                        T::COLLECTION
                    )));
                }
            }
            state.commit(stored);
        }
        debug!(collection = T::COLLECTION, documents = state.docs.len(), "collection loaded");

        Ok(Collection {
            state: RwLock::new(state),
            persistence: Some(persistence),
        })
    }

    pub async fn insert(&self, document: T) -> Result<T, StorageError> {
        let mut state = self.state.write().await;
        let id = document.id();
        if state.docs.contains_key(&id) {
            return Err(StorageError::DuplicateId {
                collection: T::COLLECTION,
                id,
            });
        }
        if let Some(key) = document.unique_key() {
            if state.key_taken(&key, None) {
                return Err(StorageError::DuplicateKey {
                    collection: T::COLLECTION,
                    key,
                });
            }
        }

        let stored = StoredDocument {
            seq: state.next_seq,
            body: document,
        };
        self.persist(&stored).await?;
        let document = stored.body.clone();
        state.commit(stored);
        Ok(document)
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.state.read().await.docs.get(&id).map(|d| d.body.clone())
    }

    /// Snapshot of every document in insertion order.
    pub async fn list(&self) -> Vec<T> {
        let state = self.state.read().await;
        state
            .order
            .values()
            .filter_map(|id| state.docs.get(id))
            .map(|d| d.body.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.docs.len()
    }

    pub async fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.state.read().await.docs.values().any(|d| predicate(&d.body))
    }

    /// Atomic read-modify-write of one document.
    ///
    /// `mutate` works on a copy of the current version. If it fails, or the
    /// result breaks a unique key, or the write to disk fails, the stored
    /// document is left untouched.
    pub async fn update<R, E, F>(&self, id: Uuid, mutate: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
        E: From<StorageError>,
    {
        let mut state = self.state.write().await;
        let current = state.docs.get(&id).ok_or(StorageError::NotFound {
            collection: T::COLLECTION,
            id,
        })?;

        let seq = current.seq;
        let mut working = current.body.clone();
        let output = mutate(&mut working)?;

        if working.id() != id {
            return Err(StorageError::Corrupt(format!("update changed the id of {}", id)).into());
        }
        if let Some(key) = working.unique_key() {
            if state.key_taken(&key, Some(id)) {
                return Err(StorageError::DuplicateKey {
                    collection: T::COLLECTION,
                    key,
                }
                .into());
            }
        }

        let stored = StoredDocument { seq, body: working };
        self.persist(&stored).await?;
        state.commit(stored);
        Ok(output)
    }

    pub async fn remove(&self, id: Uuid) -> Result<T, StorageError> {
        let mut state = self.state.write().await;
        if !state.docs.contains_key(&id) {
            return Err(StorageError::NotFound {
                collection: T::COLLECTION,
                id,
            });
        }
        if let Some(persistence) = &self.persistence {
            persistence.delete(T::COLLECTION, id).await?;
        }

        let stored = state.docs.remove(&id).ok_or(StorageError::NotFound {
            collection: T::COLLECTION,
            id,
        })?;
        state.order.remove(&stored.seq);
        if let Some(key) = stored.body.unique_key() {
            state.keys.remove(&key);
        }
        Ok(stored.body)
    }

    async fn persist(&self, stored: &StoredDocument<T>) -> Result<(), StorageError> {
        match &self.persistence {
            Some(persistence) => persistence.save(T::COLLECTION, stored.body.id(), stored).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Badge {
        id: Uuid,
        code: String,
        count: u32,
    }

    impl Document for Badge {
        const COLLECTION: &'static str = "badges";

        fn id(&self) -> Uuid {
            self.id
        }

        fn unique_key(&self) -> Option<String> {
            Some(self.code.to_lowercase())
        }
    }

    fn badge(code: &str) -> Badge {
        Badge {
            id: Uuid::new_v4(),
            code: code.to_string(),
            count: 0,
        }
    }

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("carevault-collection-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let badges = Collection::in_memory();
        let codes = ["delta", "alpha", "charlie", "bravo"];
        for code in codes {
            badges.insert(badge(code)).await.unwrap();
        }
        let listed: Vec<_> = badges.list().await.into_iter().map(|b| b.code).collect();
        assert_eq!(listed, codes);
    }

    #[tokio::test]
    async fn test_unique_key_case_insensitive() {
        let badges = Collection::in_memory();
        badges.insert(badge("Alpha")).await.unwrap();
        let err = badges.insert(badge("ALPHA")).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert_eq!(badges.count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_id_is_not_a_key_clash() {
        let badges = Collection::in_memory();
        let first = badges.insert(badge("alpha")).await.unwrap();
        let mut copy = badge("bravo");
        copy.id = first.id;
        let err = badges.insert(copy).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId { id, .. } if id == first.id));
        assert_eq!(badges.list().await, vec![first]);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document() {
        let badges = Collection::in_memory();
        let taken = badges.insert(badge("alpha")).await.unwrap();
        let target = badges.insert(badge("bravo")).await.unwrap();

        let result: Result<(), StorageError> = badges
            .update(target.id, |b| {
                b.count = 9;
                b.code = taken.code.clone();
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::DuplicateKey { .. })));
        assert_eq!(badges.get(target.id).await, Some(target.clone()));

        let result: Result<(), StorageError> = badges
            .update(target.id, |b| {
                b.count = 9;
                Err(StorageError::Corrupt("rejected".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(badges.get(target.id).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_serialize() {
        let badges = Arc::new(Collection::in_memory());
        let target = badges.insert(badge("alpha")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let badges = Arc::clone(&badges);
            handles.push(tokio::spawn(async move {
                badges
                    .update(target.id, |b| -> Result<(), StorageError> {
                        b.count += 1;
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(badges.get(target.id).await.unwrap().count, 32);
    }

    #[tokio::test]
    async fn test_remove_frees_key() {
        let badges = Collection::in_memory();
        let first = badges.insert(badge("alpha")).await.unwrap();
        badges.remove(first.id).await.unwrap();
        assert!(matches!(badges.remove(first.id).await, Err(StorageError::NotFound { .. })));
        badges.insert(badge("alpha")).await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_restores_order() {
        let dir = scratch_dir();
        let persistence = Arc::new(PersistenceManager::new(&dir).await.unwrap());
        {
            let badges: Collection<Badge> =
                Collection::persistent(Arc::clone(&persistence)).await.unwrap();
            for code in ["zulu", "echo", "kilo"] {
                badges.insert(badge(code)).await.unwrap();
            }
            let echo = badges.list().await[1].clone();
            badges
                .update(echo.id, |b| -> Result<(), StorageError> {
                    b.count = 3;
                    Ok(())
                })
                .await
                .unwrap();
        }

        let reopened: Collection<Badge> = Collection::persistent(persistence).await.unwrap();
        let listed = reopened.list().await;
        let codes: Vec<_> = listed.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["zulu", "echo", "kilo"]);
        assert_eq!(listed[1].count, 3);

        reopened.insert(badge("lima")).await.unwrap();
        assert_eq!(reopened.list().await.last().unwrap().code, "lima");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_state() {
        let dir = scratch_dir();
        let persistence = Arc::new(PersistenceManager::new(&dir).await.unwrap());
        let badges: Collection<Badge> = Collection::persistent(persistence).await.unwrap();
        let stored = badges.insert(badge("alpha")).await.unwrap();

        // Replace the collection directory with a plain file so writes fail.
        std::fs::remove_dir_all(dir.join("badges")).unwrap();
        std::fs::write(dir.join("badges"), b"").unwrap();

        let result: Result<(), StorageError> = badges
            .update(stored.id, |b| {
                b.count = 5;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::Persistence(_))));
        assert_eq!(badges.get(stored.id).await.unwrap().count, 0);
        assert!(badges.insert(badge("bravo")).await.is_err());
        assert_eq!(badges.count().await, 1);

        let _ = std::fs::remove_file(dir.join("badges"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
