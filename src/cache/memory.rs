//! In-process object store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{Clock, ObjectMeta, ObjectStore, ObjectStoreError, SystemClock};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    last_modified: DateTime<Utc>,
}

/// Thread-safe in-memory [`ObjectStore`]; writes are stamped with the store's clock.
///
/// Nothing expires on its own. Used behind an [`ObjectCache`](super::ObjectCache), expired
/// entries are deleted as lookups find them; entries that are never requested again stay
/// until the process exits.
///
/// Clones share the same objects, so a test can keep one handle and give another to an
/// [`ObjectCache`](super::ObjectCache).
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// An empty store stamping writes with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store stamping writes with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Returns `true` if an object is stored at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn not_found(key: &str) -> ObjectStoreError {
        ObjectStoreError::NotFound {
            key: key.to_owned(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError> {
        self.objects
            .get(key)
            .map(|object| ObjectMeta {
                last_modified: object.last_modified,
            })
            .ok_or_else(|| Self::not_found(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), ObjectStoreError> {
        let object = StoredObject {
            body,
            last_modified: self.clock.now(),
        };
        self.objects.insert(key.to_owned(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    #[tokio::test]
    async fn put_head_get() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = MemoryObjectStore::with_clock(clock.clone());

        store.put("a", Bytes::from_static(b"one")).await.unwrap();
        assert_eq!(store.head("a").await.unwrap().last_modified.timestamp(), 1_000);
        assert_eq!(store.get("a").await.unwrap(), Bytes::from_static(b"one"));

        clock.advance(5);
        store.put("a", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.head("a").await.unwrap().last_modified.timestamp(), 1_005);
        assert_eq!(store.get("a").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryObjectStore::new();
        assert!(store.is_empty());
        assert!(matches!(
            store.head("nope").await,
            Err(ObjectStoreError::NotFound { key }) if key == "nope"
        ));
        assert!(matches!(
            store.get("nope").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.put("k", Bytes::from_static(b"v")).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.contains("k"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clones_share_objects() {
        let store = MemoryObjectStore::new();
        let other = store.clone();
        other.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert!(store.contains("k"));
    }
}
