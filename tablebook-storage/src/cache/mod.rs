//! Advisory cache layer.
//!
//! The record store is authoritative. Everything here is a derived projection
//! that may be deleted at any time and recomputed from the store.
//!
//! # Components
//!
//! - [`CacheStore`]: byte-level key/value contract with TTL and prefix delete
//! - [`CacheKey`]: the persisted key taxonomy
//! - [`InMemoryCacheStore`] and [`LmdbCacheStore`]: backends
//! - [`CacheCoordinator`]: read-through and invalidate-on-write, one handler
//!   per namespace
//!
//! # Invalidation
//!
//! Writes delete keys; they never rewrite cached values. Parameterised keys
//! (availability queries, filtered lists) are removed with a prefix sweep.
//! A sweep is not atomic across keys: while it runs, a reader can still be
//! served a key the sweep has not reached yet.

mod coordinator;
mod freshness;
mod keys;
mod lmdb_backend;
mod memory;
mod namespaces;
mod traits;

pub use coordinator::CacheCoordinator;
pub use freshness::{CacheRead, Freshness, ReadSource};
pub use keys::{prefix, CacheKey};
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use namespaces::{ReportCache, ReservationCache, TableCache, TokenCache, TokenStatus, UserCache};
pub use traits::{CacheStats, CacheStore};
