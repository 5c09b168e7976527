//! Tablebook Storage - Record Store and Cache Coordination
//!
//! Defines the record store contract and its adapters, plus the advisory
//! cache layer that sits in front of it.

pub mod cache;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod store;

pub use cache::{
    CacheCoordinator, CacheKey, CacheRead, CacheStats, CacheStore, Freshness,
    InMemoryCacheStore, LmdbCacheError, LmdbCacheStore, ReadSource, TokenStatus,
};
pub use memory::InMemoryRecordStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PgRecordStore};
pub use query::{SqlBuilder, SqlParam};
pub use store::{RecordStore, TableRef};
