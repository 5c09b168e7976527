//! Freshness contracts for cache reads.
//!
//! Callers state whether a read may be served from cache. Decisions that must
//! reflect the latest committed write (booking-time conflict checks) use
//! `Consistent`; display paths use `BestEffort`, whose staleness is bounded
//! by the namespace TTL and by invalidation on write.

/// Staleness tolerance of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve from cache when present.
    #[default]
    BestEffort,
    /// Bypass the cached value and read the store. The fresh result is still
    /// written back to the cache.
    Consistent,
}

impl Freshness {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Freshness::Consistent)
    }
}

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

/// Result of a cache-mediated read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
        }
    }

    pub fn from_store(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Store,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        self.source == ReadSource::Store
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            source: self.source,
        }
    }
}
