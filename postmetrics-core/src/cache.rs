//! In-process cache tier
//!
//! [`MemoryCache`] backs the short-lived tier inside a single process. It also
//! implements the durable interface (entries without expiry) so an embedding
//! application can run without SQLite.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;
use crate::tiers::{DurableCache, ExpiringCache};
use crate::types::CacheKey;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Mutex-guarded map of cache entries.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: CacheKey) -> Option<u64> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value)
    }

    fn write(&self, key: CacheKey, value: u64, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, Entry { value, expires_at });
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExpiringCache for MemoryCache {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>> {
        Ok(self.read(key))
    }

    async fn set(&self, key: CacheKey, value: u64, ttl: Duration) -> Result<()> {
        self.write(key, value, Some(ttl));
        Ok(())
    }
}

#[async_trait]
impl DurableCache for MemoryCache {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>> {
        Ok(self.read(key))
    }

    async fn set(&self, key: CacheKey, value: u64) -> Result<()> {
        self.write(key, value, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metric;

    #[tokio::test]
    async fn test_expiring_entries() {
        let cache = MemoryCache::new();
        let key = CacheKey::new(1, Metric::Views);

        ExpiringCache::set(&cache, key, 40, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(ExpiringCache::get(&cache, key).await.unwrap(), Some(40));

        ExpiringCache::set(&cache, key, 41, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(ExpiringCache::get(&cache, key).await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_durable_entries_never_expire() {
        let cache = MemoryCache::new();
        let key = CacheKey::new(2, Metric::Sessions);

        assert_eq!(DurableCache::get(&cache, key).await.unwrap(), None);
        DurableCache::set(&cache, key, 0).await.unwrap();
        assert_eq!(DurableCache::get(&cache, key).await.unwrap(), Some(0));
    }
}
