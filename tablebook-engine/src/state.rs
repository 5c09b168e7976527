//! Engine composition root.

use std::sync::Arc;
use tablebook_core::{EngineConfig, EngineResult};
use tablebook_storage::{CacheCoordinator, CacheStats, CacheStore, RecordStore};

use crate::accounts::AccountService;
use crate::availability::AvailabilityChecker;
use crate::booking::BookingService;
use crate::stats::StatsAggregator;
use crate::tables::TableService;

/// Every component, wired to one record store and one cache coordinator.
///
/// Cheap to clone; clones share the store, the cache and its invalidation
/// generation.
#[derive(Clone)]
pub struct Engine {
    pub availability: AvailabilityChecker,
    pub bookings: BookingService,
    pub tables: TableService,
    pub accounts: AccountService,
    pub stats: StatsAggregator,
    cache: Arc<CacheCoordinator>,
    config: EngineConfig,
}

impl Engine {
    /// Build the engine. Fails if `config` does not validate.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache_store: Arc<dyn CacheStore>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;

        let cache = Arc::new(CacheCoordinator::new(cache_store, config.ttl.clone()));
        let availability = AvailabilityChecker::new(store.clone(), cache.clone());

        tracing::info!(
            availability_ttl_secs = config.ttl.availability.as_secs(),
            closed_month_ttl_secs = config.ttl.closed_month_report.as_secs(),
            "engine initialized"
        );

        Ok(Self {
            bookings: BookingService::new(store.clone(), cache.clone(), availability.clone()),
            tables: TableService::new(store.clone(), cache.clone(), availability.clone()),
            accounts: AccountService::new(store.clone(), cache.clone()),
            stats: StatsAggregator::new(store, cache.clone(), config.reports.clone()),
            availability,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    /// Cache backend statistics, if the backend can report them.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.stats().await
    }
}
