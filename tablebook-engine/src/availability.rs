//! Availability Checker
//!
//! Slots are exact points in time: a table is taken at (date, time) iff an
//! active reservation holds that exact table number, date and time. There is
//! no duration model, so 19:00 and 19:30 never collide.
//!
//! The booking-time decision always asks the record store. Listing free
//! tables for display may be served from cache.

use chrono::NaiveDate;
use std::sync::Arc;
use tablebook_core::{ConflictError, EngineResult, SlotTime, Table, TableAvailabilityFilter};
use tablebook_storage::{CacheCoordinator, CacheRead, Freshness, RecordStore};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;

#[derive(Clone)]
pub struct AvailabilityChecker {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheCoordinator>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<CacheCoordinator>) -> Self {
        Self { store, cache }
    }

    /// Whether no active reservation holds the slot. Never reads the cache.
    ///
    /// A store failure is returned as an error, never as "unavailable".
    pub async fn is_available(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
        cancel: &CancellationToken,
    ) -> EngineResult<bool> {
        let taken = cancellable(cancel, self.store.check_conflict(table_number, date, time))
            .await
            .inspect_err(|e| {
                if e.is_transient() {
                    tracing::error!(table_number, %date, %time, error = %e, "conflict check failed");
                }
            })?;
        tracing::debug!(table_number, %date, %time, taken, "conflict check");
        Ok(!taken)
    }

    /// Like [`is_available`](Self::is_available), but a taken slot is a
    /// `ConflictError` scoped to `tableNumber`.
    pub async fn ensure_available(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if self.is_available(table_number, date, time, cancel).await? {
            Ok(())
        } else {
            Err(ConflictError::SlotUnavailable {
                table_number: table_number.to_string(),
                date,
                time,
            }
            .into())
        }
    }

    /// Tables matching `filter`, ordered by number.
    ///
    /// With a date but no time, a table with any active reservation that day
    /// is excluded, which is stricter than [`is_available`](Self::is_available).
    /// Existing clients depend on that, so it is kept.
    pub async fn list_available(
        &self,
        filter: &TableAvailabilityFilter,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<Table>>> {
        let store = &self.store;
        cancellable(
            cancel,
            self.cache
                .tables()
                .available(filter, freshness, || store.list_available_tables(filter)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablebook_core::{CacheTtlPolicy, ReservationStatus};
    use tablebook_storage::{InMemoryCacheStore, InMemoryRecordStore};
    use tablebook_test_utils::fixtures::{date, seed, slot, store_with_tables};

    async fn checker() -> (AvailabilityChecker, InMemoryRecordStore) {
        let store = store_with_tables().await;
        let cache = Arc::new(CacheCoordinator::new(
            Arc::new(InMemoryCacheStore::new()),
            CacheTtlPolicy::default(),
        ));
        (AvailabilityChecker::new(Arc::new(store.clone()), cache), store)
    }

    #[tokio::test]
    async fn test_only_active_statuses_block() {
        let (checker, store) = checker().await;
        let day = date(2025, 12, 25);
        let token = CancellationToken::new();
        seed(&store, "T1", day, "19:00", ReservationStatus::Cancelled);
        seed(&store, "T2", day, "19:00", ReservationStatus::Completed);
        seed(&store, "T3", day, "19:00", ReservationStatus::Confirmed);

        assert!(checker.is_available("T1", day, slot("19:00"), &token).await.unwrap());
        assert!(checker.is_available("T2", day, slot("19:00"), &token).await.unwrap());
        assert!(!checker.is_available("T3", day, slot("19:00"), &token).await.unwrap());
        // Exact match only.
        assert!(checker.is_available("T3", day, slot("19:30"), &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_outage_is_error_not_unavailable() {
        let (checker, store) = checker().await;
        store.set_offline(true);
        let err = checker
            .is_available("T1", date(2025, 12, 25), slot("19:00"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_ensure_available_names_table_number() {
        let (checker, store) = checker().await;
        let day = date(2025, 12, 25);
        seed(&store, "T1", day, "19:00", ReservationStatus::Pending);
        let err = checker
            .ensure_available("T1", day, slot("19:00"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            err.field_errors().unwrap().get("tableNumber"),
            Some("Table not available at this time")
        );
    }

    #[tokio::test]
    async fn test_date_only_listing_excludes_whole_day() {
        let (checker, store) = checker().await;
        let day = date(2025, 12, 25);
        let token = CancellationToken::new();
        seed(&store, "T1", day, "12:00", ReservationStatus::Pending);

        let whole_day = checker
            .list_available(&TableAvailabilityFilter::on_date(day), Freshness::BestEffort, &token)
            .await
            .unwrap()
            .into_value();
        assert!(whole_day.iter().all(|t| t.number != "T1"));

        let evening = checker
            .list_available(
                &TableAvailabilityFilter::for_slot(day, slot("19:00")),
                Freshness::BestEffort,
                &token,
            )
            .await
            .unwrap()
            .into_value();
        assert!(evening.iter().any(|t| t.number == "T1"));
    }
}
