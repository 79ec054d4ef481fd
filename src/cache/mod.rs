//! Response caching — key derivation, the store contract, and a reference backend.
//!
//! The dispatcher only talks to [`CacheStore`]. [`ObjectCache`] implements it on top of
//! any [`ObjectStore`] (byte get/put by key plus a cheap last-modified probe), judging
//! freshness from the object's last write. [`MemoryObjectStore`] is the in-process object
//! store used for local development and tests.
//!
//! Reads have two views. [`CacheStore::lookup`] reports exactly what happened: a hit, a
//! miss with its reason, or a backend/corruption error. [`CacheStore::retrieve`] folds all
//! of that into `Option` for the dispatcher, which must never fail a request because the
//! cache misbehaved.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gateway::Reply;

pub mod clock;
pub mod key;
pub mod memory;
pub mod object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CacheKey;
pub use memory::MemoryObjectStore;
pub use object::{ObjectCache, ObjectMeta, ObjectStore, ObjectStoreError};

/// Default freshness window, in seconds.
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Why a lookup found nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No entry is stored under the key.
    Absent,
    /// An entry exists but was last written longer than the freshness window ago.
    Expired { age_secs: i64 },
}

/// Outcome of a cache read that reached the backend without faulting.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Reply),
    Miss(MissReason),
}

/// Cache faults. Never surfaced to request handling; see [`CacheStore::retrieve`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failed: {0}")]
    Backend(#[from] ObjectStoreError),

    #[error("cached entry {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode reply for caching: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Time-bounded storage of handler replies keyed by request fingerprint.
///
/// Implementations must be safe to share across concurrently served requests.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the entry for `key`, distinguishing every outcome.
    async fn lookup(&self, key: &CacheKey) -> Result<Lookup, CacheError>;

    /// Writes `reply` under `key`, replacing whatever was there.
    async fn store(&self, key: &CacheKey, reply: &Reply) -> Result<(), CacheError>;

    /// Reads the entry for `key`, treating every miss and every fault as absent.
    async fn retrieve(&self, key: &CacheKey) -> Option<Reply> {
        match self.lookup(key).await {
            Ok(Lookup::Hit(reply)) => Some(reply),
            Ok(Lookup::Miss(reason)) => {
                debug!(%key, ?reason, "cache miss");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }
}
