//! Reference cache backend over an object store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use super::{
    CacheError, CacheKey, CacheStore, Clock, DEFAULT_MAX_AGE_SECS, Lookup, MissReason,
    SystemClock,
};
use crate::config::CacheSettings;
use crate::gateway::Reply;

/// Object store faults.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("no object stored at {key}")]
    NotFound { key: String },

    #[error("object store request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Metadata readable without downloading the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub last_modified: DateTime<Utc>,
}

/// A blob store: whole-object get/put/delete by key, plus a metadata probe.
///
/// Timeouts and retries are the client library's business; the cache doesn't wrap them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object's metadata without fetching its payload.
    async fn head(&self, key: &str) -> Result<ObjectMeta, ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// Writes `body` under `key`, replacing any existing object and its timestamp.
    async fn put(&self, key: &str, body: Bytes) -> Result<(), ObjectStoreError>;

    /// Removes the object at `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// A [`CacheStore`] that keeps JSON-encoded replies in an [`ObjectStore`].
///
/// Entries live at `prefix + fingerprint`. An entry is fresh while
/// `now - last_modified <= max_age`, both timestamps truncated to whole seconds, so an
/// entry aged exactly `max_age` seconds is still served. A lookup that finds an expired
/// entry deletes it, so stores without their own lifecycle rules don't grow without bound.
///
/// # Examples
///
/// ```
/// use lambda_page::cache::{MemoryObjectStore, ObjectCache};
///
/// let cache = ObjectCache::new(MemoryObjectStore::new())
///     .with_max_age(60)
///     .with_prefix("pages/");
/// assert_eq!(cache.max_age_secs(), 60);
/// ```
pub struct ObjectCache<S> {
    store: S,
    max_age_secs: u64,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl<S: ObjectStore> ObjectCache<S> {
    /// Wraps `store` with the default 300 second window, no prefix, and the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            prefix: String::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Wraps `store` with the window and prefix from configuration.
    pub fn from_settings(store: S, settings: &CacheSettings) -> Self {
        Self::new(store)
            .with_max_age(settings.max_age_secs)
            .with_prefix(settings.prefix.clone())
    }

    /// Sets the freshness window in seconds.
    #[must_use]
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age_secs = seconds;
        self
    }

    /// Sets the string prepended to every fingerprint, e.g. `pages/`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replaces the clock freshness is judged against.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The wrapped object store.
    pub fn objects(&self) -> &S {
        &self.store
    }

    fn object_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key)
    }

    // Negative ages (a backend clock ahead of ours) count as fresh.
    fn age_secs(&self, last_modified: DateTime<Utc>) -> i64 {
        self.clock.now().timestamp() - last_modified.timestamp()
    }

    fn is_fresh(&self, age_secs: i64) -> bool {
        i64::try_from(self.max_age_secs).map_or(true, |max_age| age_secs <= max_age)
    }
}

#[async_trait]
impl<S: ObjectStore> CacheStore for ObjectCache<S> {
    async fn lookup(&self, key: &CacheKey) -> Result<Lookup, CacheError> {
        let object_key = self.object_key(key);

        let meta = match self.store.head(&object_key).await {
            Ok(meta) => meta,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(Lookup::Miss(MissReason::Absent)),
            Err(e) => return Err(e.into()),
        };

        let age_secs = self.age_secs(meta.last_modified);
        if !self.is_fresh(age_secs) {
            // Eviction is best effort; the entry is a miss either way.
            if let Err(e) = self.store.delete(&object_key).await {
                warn!(key = %object_key, error = %e, "failed to evict expired cache entry");
            }
            return Ok(Lookup::Miss(MissReason::Expired { age_secs }));
        }

        // The object may vanish between the probe and the download.
        let payload = match self.store.get(&object_key).await {
            Ok(payload) => payload,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(Lookup::Miss(MissReason::Absent)),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&payload)
            .map(Lookup::Hit)
            .map_err(|source| CacheError::Corrupt {
                key: object_key,
                source,
            })
    }

    async fn store(&self, key: &CacheKey, reply: &Reply) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(reply).map_err(CacheError::Encode)?;
        self.store
            .put(&self.object_key(key), Bytes::from(payload))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryObjectStore};
    use crate::gateway::GatewayRequest;
    use serde_json::json;

    const T0: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        objects: MemoryObjectStore,
        cache: ObjectCache<MemoryObjectStore>,
        key: CacheKey,
    }

    fn fixture(max_age: u64) -> Fixture {
        let clock = Arc::new(ManualClock::at_timestamp(T0));
        let objects = MemoryObjectStore::with_clock(clock.clone());
        let cache = ObjectCache::new(objects.clone())
            .with_max_age(max_age)
            .with_clock(clock.clone());
        let key = CacheKey::derive("/", &GatewayRequest::new("get").with_path("/"));
        Fixture {
            clock,
            objects,
            cache,
            key,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn head(&self, _key: &str) -> Result<ObjectMeta, ObjectStoreError> {
            Err(ObjectStoreError::Transport("connection reset".into()))
        }

        async fn get(&self, _key: &str) -> Result<Bytes, ObjectStoreError> {
            Err(ObjectStoreError::Transport("connection reset".into()))
        }

        async fn put(&self, _key: &str, _body: Bytes) -> Result<(), ObjectStoreError> {
            Err(ObjectStoreError::Transport("connection reset".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), ObjectStoreError> {
            Err(ObjectStoreError::Transport("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn empty_store_is_absent() {
        let f = fixture(300);
        assert_eq!(
            f.cache.lookup(&f.key).await.unwrap(),
            Lookup::Miss(MissReason::Absent)
        );
        assert_eq!(f.cache.retrieve(&f.key).await, None);
    }

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let f = fixture(300);
        let reply = Reply::with_status(201, json!({"items": [1, 2, 3]}));
        f.cache.store(&f.key, &reply).await.unwrap();
        assert_eq!(f.cache.lookup(&f.key).await.unwrap(), Lookup::Hit(reply));
    }

    #[tokio::test]
    async fn freshness_boundary() {
        let f = fixture(300);
        let reply = Reply::body("fresh");
        f.cache.store(&f.key, &reply).await.unwrap();

        f.clock.set(T0 + 299);
        assert_eq!(f.cache.retrieve(&f.key).await, Some(reply.clone()));

        // Exactly max_age old is still fresh.
        f.clock.set(T0 + 300);
        assert_eq!(f.cache.retrieve(&f.key).await, Some(reply));

        f.clock.set(T0 + 301);
        assert_eq!(
            f.cache.lookup(&f.key).await.unwrap(),
            Lookup::Miss(MissReason::Expired { age_secs: 301 })
        );
        assert_eq!(f.cache.retrieve(&f.key).await, None);
    }

    #[tokio::test]
    async fn rewrite_restarts_the_window() {
        let f = fixture(10);
        f.cache.store(&f.key, &Reply::body("old")).await.unwrap();

        f.clock.advance(11);
        assert_eq!(f.cache.retrieve(&f.key).await, None);

        f.cache.store(&f.key, &Reply::body("new")).await.unwrap();
        f.clock.advance(10);
        assert_eq!(f.cache.retrieve(&f.key).await, Some(Reply::body("new")));
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let f = fixture(10);
        f.cache.store(&f.key, &Reply::body("stale")).await.unwrap();

        f.clock.advance(10);
        assert!(f.cache.retrieve(&f.key).await.is_some());
        assert_eq!(f.objects.len(), 1);

        f.clock.advance(1);
        assert_eq!(
            f.cache.lookup(&f.key).await.unwrap(),
            Lookup::Miss(MissReason::Expired { age_secs: 11 })
        );
        assert!(f.objects.is_empty());
        assert_eq!(
            f.cache.lookup(&f.key).await.unwrap(),
            Lookup::Miss(MissReason::Absent)
        );
    }

    #[tokio::test]
    async fn float_bodies_round_trip_exactly() {
        let f = fixture(300);
        for value in [1.0715660391465826e-75, 0.1, 5e-324, 1.7976931348623157e308] {
            let reply = Reply::body(json!({"value": value, "halves": [value / 2.0]}));
            f.cache.store(&f.key, &reply).await.unwrap();
            assert_eq!(f.cache.lookup(&f.key).await.unwrap(), Lookup::Hit(reply));
        }
    }

    #[tokio::test]
    async fn future_timestamps_are_fresh() {
        let f = fixture(10);
        f.cache.store(&f.key, &Reply::body("skewed")).await.unwrap();
        f.clock.set(T0 - 60);
        assert_eq!(f.cache.retrieve(&f.key).await, Some(Reply::body("skewed")));
    }

    #[tokio::test]
    async fn entries_live_under_the_prefix() {
        let f = fixture(300);
        let cache = ObjectCache::new(f.objects.clone())
            .with_prefix("pages/")
            .with_clock(f.clock.clone());
        cache.store(&f.key, &Reply::body("x")).await.unwrap();

        assert!(f.objects.contains(&format!("pages/{}", f.key)));
        assert!(!f.objects.contains(f.key.as_str()));
        // The unprefixed cache sees nothing.
        assert_eq!(f.cache.retrieve(&f.key).await, None);
    }

    #[tokio::test]
    async fn corrupt_payload_is_an_error_but_retrieves_as_absent() {
        let f = fixture(300);
        f.objects
            .put(f.key.as_str(), Bytes::from_static(b"not json"))
            .await
            .unwrap();

        let err = f.cache.lookup(&f.key).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
        assert_eq!(f.cache.retrieve(&f.key).await, None);
    }

    #[tokio::test]
    async fn backend_faults_are_errors_but_retrieve_as_absent() {
        let cache = ObjectCache::new(BrokenStore);
        let key = CacheKey::derive("/", &GatewayRequest::new("get").with_path("/"));

        assert!(matches!(
            cache.lookup(&key).await,
            Err(CacheError::Backend(ObjectStoreError::Transport(_)))
        ));
        assert_eq!(cache.retrieve(&key).await, None);
        assert!(matches!(
            cache.store(&key, &Reply::body("x")).await,
            Err(CacheError::Backend(_))
        ));
    }

    #[test]
    fn settings_apply() {
        let settings = CacheSettings {
            max_age_secs: 42,
            prefix: "p/".to_owned(),
        };
        let cache = ObjectCache::from_settings(MemoryObjectStore::new(), &settings);
        assert_eq!(cache.max_age_secs(), 42);
        assert_eq!(cache.prefix(), "p/");
    }
}
