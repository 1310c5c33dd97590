//! In-process cache provider on [`moka`].
//!
//! Entries are stored as JSON text with their own TTL. Expired entries are
//! evicted by moka's housekeeping and the cache is bounded by
//! `max_capacity`, so keys that are never read again do not accumulate.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::provider::{AtomicCacheProvider, CacheProvider};

/// Default upper bound on the number of entries.
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it was written with.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// Thread-safe in-memory cache with per-entry TTL.
#[derive(Clone)]
pub struct MemoryCacheProvider {
    entries: Cache<String, Entry>,
}

impl MemoryCacheProvider {
    /// Creates a cache holding at most [`DEFAULT_MAX_CAPACITY`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    /// Creates a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Returns the number of live entries after running pending evictions.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Returns `true` if the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCacheProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheProvider")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

fn check_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

fn entry<T: Serialize>(value: &T, ttl: Option<Duration>) -> CacheResult<Entry> {
    Ok(Entry {
        value: serde_json::to_string(value)?,
        ttl,
    })
}

fn decode<T: DeserializeOwned>(entry: Option<Entry>) -> CacheResult<Option<T>> {
    entry
        .map(|e| serde_json::from_str(&e.value))
        .transpose()
        .map_err(Into::into)
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        decode(self.entries.get(key).await)
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        check_key(key)?;
        let entry = entry(value, ttl)?;
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| String::clone(&key))
            .collect();

        let mut deleted = 0;
        for key in keys {
            if self.entries.remove(&key).await.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(())
    }
}

#[async_trait]
impl AtomicCacheProvider for MemoryCacheProvider {
    async fn set_nx<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        check_key(key)?;
        let entry = entry(value, ttl)?;
        let stored = self
            .entries
            .entry(key.to_string())
            .or_insert_with(async move { entry })
            .await;
        Ok(stored.is_fresh())
    }

    async fn get_del<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        decode(self.entries.remove(key).await)
    }
}
