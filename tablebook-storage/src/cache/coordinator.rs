//! Read-through / invalidate-on-write coordination.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablebook_core::{CacheTtlPolicy, EngineResult, Reservation, YearMonth};

use super::freshness::{CacheRead, Freshness};
use super::keys::CacheKey;
use super::namespaces::{ReportCache, ReservationCache, TableCache, TokenCache, UserCache};
use super::traits::{CacheStats, CacheStore};

/// Shared access to the cache store.
///
/// Every cache failure is logged and swallowed here: a failed read is a miss,
/// a failed write or delete is left for TTL expiry to clean up.
#[derive(Clone)]
pub(crate) struct CacheHandle {
    store: Arc<dyn CacheStore>,
    /// Bumped by every invalidation in this handle's namespace. A
    /// read-through whose load overlapped an invalidation does not populate,
    /// so a pre-write value cannot be cached after the write's delete ran.
    /// The check-then-set itself is not atomic; the remaining window is
    /// bounded by the namespace TTL.
    generation: Arc<AtomicU64>,
}

impl CacheHandle {
    pub(crate) fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A handle on the same store with its own invalidation generation, so
    /// deletes in one namespace never hold back loads in another.
    pub(crate) fn scoped(&self) -> Self {
        Self::new(self.store.clone())
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    // Not an invalidation: loads in flight may still populate.
                    if let Err(e) = self.store.delete(key).await {
                        tracing::warn!(key, error = %e, "cache purge failed");
                    }
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    pub(crate) async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &bytes, ttl).await {
            tracing::warn!(key, error = %e, "cache populate failed");
        }
    }

    pub(crate) async fn delete(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.store.delete(key).await {
            Ok(()) => tracing::debug!(key, "cache key invalidated"),
            Err(e) => tracing::warn!(key, error = %e, "cache invalidation failed"),
        }
    }

    pub(crate) async fn delete_prefix(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.store.delete_by_prefix(prefix).await {
            Ok(removed) => tracing::debug!(prefix, removed, "cache prefix swept"),
            Err(e) => tracing::warn!(prefix, error = %e, "cache prefix sweep failed"),
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, observed: u64) {
        if self.generation.load(Ordering::SeqCst) != observed {
            tracing::debug!(key, "invalidation during load, not caching");
            return;
        }
        self.set_json(key, value, ttl).await;
    }

    /// Serve `key` from cache, or run `load` against the store and cache the result.
    pub(crate) async fn read_through<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let key = key.to_string();
        if !freshness.is_consistent() {
            if let Some(value) = self.get_json::<T>(&key).await {
                return Ok(CacheRead::from_cache(value));
            }
        }
        let observed = self.generation.load(Ordering::SeqCst);
        let value = load().await?;
        self.populate(&key, &value, ttl, observed).await;
        Ok(CacheRead::from_store(value))
    }

    /// Like [`read_through`](Self::read_through) for lookups that may find
    /// nothing. Absence is not cached.
    pub(crate) async fn read_through_optional<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<T>>>,
    {
        let key = key.to_string();
        if !freshness.is_consistent() {
            if let Some(value) = self.get_json::<T>(&key).await {
                return Ok(Some(CacheRead::from_cache(value)));
            }
        }
        let observed = self.generation.load(Ordering::SeqCst);
        match load().await? {
            Some(value) => {
                self.populate(&key, &value, ttl, observed).await;
                Ok(Some(CacheRead::from_store(value)))
            }
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Option<CacheStats> {
        match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "cache stats unavailable");
                None
            }
        }
    }
}

/// Owns the cache namespaces and the invalidation protocol.
///
/// All five namespace handlers are built up front and share one store. Each
/// tracks its own invalidation generation.
/// Invalidation methods must only be called after the record store has
/// confirmed the write they follow.
pub struct CacheCoordinator {
    handle: CacheHandle,
    tokens: TokenCache,
    users: UserCache,
    tables: TableCache,
    reservations: ReservationCache,
    reports: ReportCache,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, ttl: CacheTtlPolicy) -> Self {
        let handle = CacheHandle::new(store);
        Self {
            tokens: TokenCache::new(handle.scoped()),
            users: UserCache::new(handle.scoped(), ttl.user),
            tables: TableCache::new(handle.scoped(), ttl.table, ttl.availability),
            reservations: ReservationCache::new(handle.scoped(), ttl.reservation),
            reports: ReportCache::new(
                handle.scoped(),
                ttl.report_list,
                ttl.open_month_report,
                ttl.closed_month_report,
            ),
            handle,
        }
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn users(&self) -> &UserCache {
        &self.users
    }

    pub fn tables(&self) -> &TableCache {
        &self.tables
    }

    pub fn reservations(&self) -> &ReservationCache {
        &self.reservations
    }

    pub fn reports(&self) -> &ReportCache {
        &self.reports
    }

    /// Invalidate everything a reservation write can affect.
    ///
    /// `affected` holds every version of the reservation the write touched:
    /// the stored result, plus the previous version when the write moved it
    /// to another owner, date or table. Removes each reservation key and
    /// owner list, every filtered list, availability queries on each
    /// affected date, and the report snapshots of each affected month.
    pub async fn invalidate_reservation_write(&self, affected: &[&Reservation]) {
        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
        let mut months: BTreeSet<YearMonth> = BTreeSet::new();
        for reservation in affected {
            self.reservations.invalidate(reservation).await;
            dates.insert(reservation.date);
            months.insert(YearMonth::of(reservation.date));
        }
        self.reservations.invalidate_lists().await;
        for date in dates {
            self.tables.invalidate_availability_on(date).await;
        }
        for month in months {
            self.reports.invalidate_month(month).await;
        }
    }

    /// Invalidate the whole table namespace: single tables, the full list
    /// and every availability query.
    pub async fn invalidate_table_write(&self) {
        self.tables.invalidate_all().await;
    }

    /// Backend statistics, if the backend can report them.
    pub async fn stats(&self) -> Option<CacheStats> {
        self.handle.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use chrono::Utc;
    use tablebook_core::EngineError;

    fn handle() -> (CacheHandle, Arc<InMemoryCacheStore>) {
        let store = Arc::new(InMemoryCacheStore::new());
        (CacheHandle::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_read_through_populates_then_hits() {
        let (handle, store) = handle();
        let key = CacheKey::TablesAll;
        let first = handle
            .read_through(&key, Duration::from_secs(60), Freshness::BestEffort, || async {
                Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
        assert!(first.was_cache_miss());
        assert!(store.contains("tables:all"));

        let second: CacheRead<Vec<i32>> = handle
            .read_through(&key, Duration::from_secs(60), Freshness::BestEffort, || async {
                Err(EngineError::Internal("must not load".into()))
            })
            .await
            .unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_consistent_bypasses_cached_value() {
        let (handle, _store) = handle();
        let key = CacheKey::TablesAll;
        handle.set_json("tables:all", &vec![1], Duration::from_secs(60)).await;
        let read = handle
            .read_through(&key, Duration::from_secs(60), Freshness::Consistent, || async {
                Ok(vec![2])
            })
            .await
            .unwrap();
        assert!(read.was_cache_miss());
        assert_eq!(read.into_value(), vec![2]);
    }

    #[tokio::test]
    async fn test_absent_entity_not_cached() {
        let (handle, store) = handle();
        let key = CacheKey::Reservation(uuid::Uuid::nil());
        let read: Option<CacheRead<String>> = handle
            .read_through_optional(&key, Duration::from_secs(60), Freshness::BestEffort, || async {
                Ok(None)
            })
            .await
            .unwrap();
        assert!(read.is_none());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_during_load_skips_populate() {
        let (handle, store) = handle();
        let key = CacheKey::TablesAll;
        let racer = handle.clone();
        let read = handle
            .read_through(&key, Duration::from_secs(60), Freshness::BestEffort, || async move {
                // A writer commits and invalidates while this load is in flight.
                racer.delete("tables:all").await;
                Ok(vec!["pre-write".to_string()])
            })
            .await
            .unwrap();
        assert!(read.was_cache_miss());
        assert!(!store.contains("tables:all"));
    }

    #[tokio::test]
    async fn test_purging_bad_entry_does_not_block_populate() {
        let (handle, store) = handle();
        store
            .set("tables:number:T1", b"not json", Duration::from_secs(60))
            .await
            .unwrap();
        let racer = handle.clone();
        handle
            .read_through(
                &CacheKey::TablesAll,
                Duration::from_secs(60),
                Freshness::BestEffort,
                || async move {
                    let _: Option<i32> = racer.get_json("tables:number:T1").await;
                    Ok(vec![1])
                },
            )
            .await
            .unwrap();
        assert!(!store.contains("tables:number:T1"));
        assert!(store.contains("tables:all"));
    }

    #[tokio::test]
    async fn test_other_namespace_invalidation_does_not_block_populate() {
        let store = Arc::new(InMemoryCacheStore::new());
        let coordinator = CacheCoordinator::new(store.clone(), CacheTtlPolicy::default());
        let tokens = coordinator.tokens();
        let reservations = coordinator.reservations();
        coordinator
            .tables()
            .all(Freshness::BestEffort, || async move {
                tokens.revoke("tok", Utc::now() + chrono::Duration::hours(1)).await;
                reservations.invalidate_lists().await;
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert!(store.contains("tables:all"));

        // Same namespace still blocks.
        let tables = coordinator.tables();
        coordinator
            .tables()
            .all(Freshness::Consistent, || async move {
                tables.invalidate_all().await;
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert!(!store.contains("tables:all"));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let (handle, store) = handle();
        store
            .set("tables:all", b"not json", Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<Vec<i32>> = handle.get_json("tables:all").await;
        assert!(value.is_none());
        assert!(!store.contains("tables:all"));
    }

    #[tokio::test]
    async fn test_store_error_propagates_through_read_through() {
        let (handle, _store) = handle();
        let err = handle
            .read_through::<Vec<i32>, _, _>(
                &CacheKey::TablesAll,
                Duration::from_secs(60),
                Freshness::BestEffort,
                || async {
                    Err(tablebook_core::StorageError::Unavailable {
                        reason: "down".into(),
                    }
                    .into())
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
