//! Table Service

use std::sync::Arc;
use tablebook_core::{EngineError, EngineResult, EntityId, NewTable, Table, TableAvailabilityFilter};
use tablebook_storage::{CacheCoordinator, CacheRead, Freshness, RecordStore, TableRef};
use tokio_util::sync::CancellationToken;

use crate::availability::AvailabilityChecker;
use crate::cancel::{cancellable, commit};
use crate::validation::validate_new_table;

#[derive(Clone)]
pub struct TableService {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheCoordinator>,
    availability: AvailabilityChecker,
}

impl TableService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<CacheCoordinator>,
        availability: AvailabilityChecker,
    ) -> Self {
        Self {
            store,
            cache,
            availability,
        }
    }

    /// Every table, ordered by number.
    pub async fn list_tables(
        &self,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<Table>>> {
        let store = &self.store;
        cancellable(
            cancel,
            self.cache.tables().all(freshness, || store.list_tables()),
        )
        .await
    }

    pub async fn get_table(
        &self,
        id: EntityId,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Table>> {
        let store = &self.store;
        let by = TableRef::Id(id);
        cancellable(
            cancel,
            self.cache
                .tables()
                .by_id(id, freshness, || store.get_table(&by)),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("table", id))
    }

    pub async fn get_table_by_number(
        &self,
        number: &str,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Table>> {
        let store = &self.store;
        let by = TableRef::Number(number.to_string());
        cancellable(
            cancel,
            self.cache
                .tables()
                .by_number(number, freshness, || store.get_table(&by)),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("table", number))
    }

    /// See [`AvailabilityChecker::list_available`].
    pub async fn list_available(
        &self,
        filter: &TableAvailabilityFilter,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<Table>>> {
        self.availability
            .list_available(filter, freshness, cancel)
            .await
    }

    /// Add a table. The number is trimmed; it must be non-blank and the
    /// capacity positive.
    pub async fn create_table(
        &self,
        table: &NewTable,
        cancel: &CancellationToken,
    ) -> EngineResult<Table> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let table = validate_new_table(table)?;
        let created = commit(cancel, async move {
            let created = store.create_table(&table).await?;
            cache.invalidate_table_write().await;
            Ok(created)
        })
        .await?;
        tracing::info!(table_id = %created.id, number = %created.number, "table created");
        Ok(created)
    }

    /// Toggle the administrative availability flag. Every cached table view
    /// is dropped, since availability queries cannot be targeted per table.
    pub async fn update_table_availability(
        &self,
        id: EntityId,
        is_available: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<Table> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let updated = commit(cancel, async move {
            let updated = store.update_table_availability(id, is_available).await?;
            cache.invalidate_table_write().await;
            Ok(updated)
        })
        .await?;
        tracing::info!(table_id = %id, is_available, "table availability updated");
        Ok(updated)
    }
}
