//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped,
//! persistent key-value cache that survives process restarts.
//!
//! # Value layout
//!
//! `[expires_at: 8 bytes, unix millis, little-endian][payload]`
//!
//! Expiry is wall-clock so that entries written before a restart still
//! expire on time. Expired entries read as misses and are removed lazily.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions:
//! - Read transactions for `get`, `stats` and collecting sweep candidates
//! - Write transactions for `set`, `delete` and the sweep itself

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tablebook_core::CacheError;

use super::traits::{CacheStats, CacheStore};

const HEADER_LEN: usize = 8;

/// Errors raised while opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn backend(e: heed::Error) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// LMDB-backed [`CacheStore`].
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl LmdbCacheStore {
    /// Open (or create) a cache under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this cache and not
        // opened twice within the process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    fn encode(value: &[u8], ttl: Duration) -> Vec<u8> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        let mut buf = Vec::with_capacity(HEADER_LEN + value.len());
        buf.extend_from_slice(&expires_at.to_le_bytes());
        buf.extend_from_slice(value);
        buf
    }

    /// Split a stored value into expiry and payload.
    fn decode(raw: &[u8]) -> Result<(i64, &[u8]), CacheError> {
        if raw.len() < HEADER_LEN {
            return Err(CacheError::Deserialization(
                "entry shorter than expiry header".to_string(),
            ));
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&raw[..HEADER_LEN]);
        Ok((i64::from_le_bytes(header), &raw[HEADER_LEN..]))
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, CacheError> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(backend)? {
            let (key, _) = result.map_err(backend)?;
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }

    fn remove_if_expired(&self, key: &[u8], now: i64) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        let expired = match self.db.get(&wtxn, key).map_err(backend)? {
            Some(raw) => Self::decode(raw).map(|(exp, _)| exp <= now).unwrap_or(true),
            None => false,
        };
        if expired {
            self.db.delete(&mut wtxn, key).map_err(backend)?;
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        wtxn.commit().map_err(backend)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = now_millis();
        let raw = {
            let rtxn = self.env.read_txn().map_err(backend)?;
            self.db
                .get(&rtxn, key.as_bytes())
                .map_err(backend)?
                .map(<[u8]>::to_vec)
        };

        let Some(raw) = raw else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        match Self::decode(&raw) {
            Ok((expires_at, payload)) if expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(payload.to_vec()))
            }
            _ => {
                // Expired or malformed: both read as a miss.
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.remove_if_expired(key.as_bytes(), now)?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let buf = Self::encode(value, ttl);
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), buf.as_slice())
            .map_err(backend)?;
        wtxn.commit().map_err(backend)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(backend)?;
        wtxn.commit().map_err(backend)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let keys = self.collect_keys_with_prefix(prefix.as_bytes())?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        let mut removed = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key.as_slice()).map_err(backend)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(backend)?;
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        let entry_count = self.db.len(&rtxn).map_err(backend)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbCacheStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, _dir) = create_test_store();
        store
            .set("reservation:1", b"{\"id\":1}", Duration::from_secs(60))
            .await
            .unwrap();
        let got = store.get("reservation:1").await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"{\"id\":1}"[..]));
        assert_eq!(store.stats().await.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_removed() {
        let (store, _dir) = create_test_store();
        store.set("k", b"v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_noop() {
        let (store, _dir) = create_test_store();
        store.delete("absent").await.unwrap();
        assert_eq!(store.delete_by_prefix("absent:").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prefix_sweep() {
        let (store, _dir) = create_test_store();
        let ttl = Duration::from_secs(60);
        store.set("tables:all", b"1", ttl).await.unwrap();
        store.set("tables:available:2025-12-25::0", b"2", ttl).await.unwrap();
        store.set("table:number:T1", b"3", ttl).await.unwrap();
        assert_eq!(store.delete_by_prefix("tables:").await.unwrap(), 2);
        assert!(store.get("table:number:T1").await.unwrap().is_some());
        assert!(store.get("tables:all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = LmdbCacheStore::new(temp_dir.path(), 10).unwrap();
            store
                .set("reports:monthly:2025-11", b"snapshot", Duration::from_secs(3600))
                .await
                .unwrap();
        }
        let reopened = LmdbCacheStore::new(temp_dir.path(), 10).unwrap();
        assert_eq!(
            reopened.get("reports:monthly:2025-11").await.unwrap(),
            Some(b"snapshot".to_vec())
        );
    }
}
