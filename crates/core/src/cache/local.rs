//! In-process LRU cache with a fixed time-to-live.
//!
//! Entries expire `ttl` after their last write; reads do not extend them.
//! Expired entries are dropped lazily on lookup and whenever the live count is
//! taken.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::{CacheEntry, CacheKey, Cacher, DEFAULT_CAPACITY, DEFAULT_TTL_SECS, Error};

/// Capacity and expiry settings for a [`LocalCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum number of entries before least-recently-used eviction.
    pub capacity: usize,
    /// Lifetime of an entry from its last write.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, ttl: Duration::from_secs(DEFAULT_TTL_SECS) }
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    written_at: Instant,
}

/// Bounded LRU+TTL page cache safe for concurrent use.
#[derive(Debug)]
pub struct LocalCache {
    entries: Mutex<LruCache<CacheKey, Slot>>,
    ttl: Duration,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl LocalCache {
    /// Create a cache; a zero capacity is raised to one.
    pub fn new(settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl: settings.ttl }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entry as-is, keeping its `created_at`.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        let slot = Slot { entry, written_at: Instant::now() };
        if let Some((evicted, _)) = self.lock().push(key.clone(), slot)
            && evicted != key
        {
            tracing::debug!(key = %evicted, "evicted least recently used entry");
        }
    }

    /// Look up the live entry for `key`, promoting it in LRU order.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheMiss` if the key is absent or expired.
    pub fn entry(&self, key: &CacheKey) -> Result<CacheEntry, Error> {
        let mut entries = self.lock();

        let expired = match entries.peek(key) {
            Some(slot) => slot.written_at.elapsed() >= self.ttl,
            None => return Err(Error::CacheMiss(key.to_string())),
        };

        if expired {
            entries.pop(key);
            tracing::debug!(key = %key, "dropped expired entry");
            return Err(Error::CacheMiss(key.to_string()));
        }

        entries
            .get(key)
            .map(|slot| slot.entry.clone())
            .ok_or_else(|| Error::CacheMiss(key.to_string()))
    }

    /// Drop expired entries and return the number of live ones.
    pub fn live_len(&self) -> usize {
        let mut entries = self.lock();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, slot)| slot.written_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        entries.len()
    }
}

#[async_trait]
impl Cacher for LocalCache {
    async fn put(&self, key: &CacheKey, data: Vec<u8>) -> Result<(), Error> {
        self.insert(key.clone(), CacheEntry::new(data));
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Vec<u8>, Error> {
        self.entry(key).map(|entry| entry.data)
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.live_len())
    }
}
