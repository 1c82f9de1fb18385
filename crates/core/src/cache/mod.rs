//! Page cache capability and its local backend.
//!
//! Rendered pages are stored gzip-compressed under a content-addressed key
//! (SHA-256 of the canonical `host + path`). Two interchangeable backends
//! implement [`Cacher`]:
//!
//! - [`LocalCache`]: in-process LRU bounded by capacity, entries expire a fixed
//!   TTL after their last write
//! - `RemoteCache` (in `prerender-client`): delegates to the storage service
//!   speaking the [`wire`] contract
//!
//! A miss or an expired entry is always reported as `Error::CacheMiss`, never
//! as stale data.

pub mod hash;
pub mod local;
pub mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::Error;

pub use hash::{CacheKey, compute_cache_key};
pub use local::{CacheSettings, LocalCache};

/// Default entry capacity of a cache backend.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Default time-to-live of an entry, measured from its last write.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// A stored page archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Compressed page bytes.
    pub data: Vec<u8>,
    /// Wall-clock time of the write that produced this entry.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, created_at: Utc::now() }
    }
}

/// Storage capability shared by the cache backends.
#[async_trait]
pub trait Cacher: Send + Sync {
    /// Store `data` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheWrite` if the backend could not persist the entry.
    async fn put(&self, key: &CacheKey, data: Vec<u8>) -> Result<(), Error>;

    /// Fetch the live entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheMiss` when there is no live entry.
    async fn get(&self, key: &CacheKey) -> Result<Vec<u8>, Error>;

    /// Number of live entries.
    async fn len(&self) -> Result<usize, Error>;

    async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}
