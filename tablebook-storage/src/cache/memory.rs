//! In-process cache store with per-entry TTL.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tablebook_core::CacheError;

use super::traits::{CacheStats, CacheStore};

/// Expiry used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE.min(ttl)))
        .unwrap_or(now)
}

#[derive(Debug)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// [`CacheStore`] kept in a process-local map. Expired entries are dropped
/// lazily on access and during prefix sweeps.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

fn poisoned() -> CacheError {
    CacheError::Backend("cache lock poisoned".to_string())
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a live entry. Does not touch statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.get(key).is_some_and(|entry| entry.expires_at > Instant::now()))
            .unwrap_or(false)
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| {
                e.iter()
                    .filter(|(_, entry)| entry.expires_at > now)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.bytes.clone()));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }
        // Expired: drop it unless a writer replaced it meanwhile.
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            bytes: value.to_vec(),
            expires_at: expiry(Instant::now(), ttl),
        };
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = Instant::now();
        let entry_count = self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|e| e.expires_at > now)
            .count() as u64;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
