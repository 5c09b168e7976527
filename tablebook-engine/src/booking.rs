//! Booking Service
//!
//! Reservation writes follow one sequence: validate, check the slot against
//! the store, write, then invalidate. The store's uniqueness guard is what
//! actually prevents double booking; the early check only turns the common
//! case into a clean conflict before anything is written. A lost race shows
//! up as `StorageError::SlotTaken` and is reported exactly like the early
//! rejection.

use std::sync::Arc;
use tablebook_core::{
    ConflictError, EngineError, EngineResult, EntityId, FieldErrors, Reservation,
    ReservationFilter, ReservationRequest, ReservationStatus, ReservationUpdate, StorageError,
    Table, ValidationError,
};
use tablebook_storage::{CacheCoordinator, CacheRead, Freshness, RecordStore, TableRef};
use tokio_util::sync::CancellationToken;

use crate::availability::AvailabilityChecker;
use crate::cancel::{cancellable, commit};
use crate::validation::{validate_request, validate_update};

/// Report a store-side uniqueness rejection as a booking conflict.
fn slot_conflict(e: EngineError) -> EngineError {
    match e {
        EngineError::Storage(StorageError::SlotTaken {
            table_number,
            date,
            time,
        }) => ConflictError::SlotUnavailable {
            table_number,
            date,
            time,
        }
        .into(),
        other => other,
    }
}

fn log_store_failure(operation: &str, e: &EngineError) {
    if e.is_transient() {
        tracing::error!(operation, error = %e, "record store unavailable");
    }
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheCoordinator>,
    availability: AvailabilityChecker,
}

impl BookingService {
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

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Book a table for `owner`. The reservation starts as pending.
    pub async fn create_reservation(
        &self,
        owner: EntityId,
        request: &ReservationRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<Reservation> {
        let new = validate_request(owner, request)?;

        self.availability
            .ensure_available(&new.table_number, new.date, new.time, cancel)
            .await?;
        let table = self.table_by_number(&new.table_number, cancel).await?;
        check_capacity(&table, new.guests)?;

        let store = self.store.clone();
        let cache = self.cache.clone();
        let created = commit(cancel, async move {
            let created = store
                .create_reservation(&new)
                .await
                .map_err(slot_conflict)?;
            cache.invalidate_reservation_write(&[&created]).await;
            Ok(created)
        })
        .await
        .inspect_err(|e| log_store_failure("create_reservation", e))?;

        tracing::info!(
            reservation_id = %created.id,
            table_number = %created.table_number,
            date = %created.date,
            time = %created.time,
            "reservation created"
        );
        Ok(created)
    }

    /// Apply a partial update. An update with no fields returns the current
    /// reservation untouched.
    pub async fn update_reservation(
        &self,
        id: EntityId,
        update: &ReservationUpdate,
        cancel: &CancellationToken,
    ) -> EngineResult<Reservation> {
        let patch = validate_update(update)?;
        let current = self.load(id, cancel).await?;
        if patch.is_empty() {
            return Ok(current);
        }

        let next = patch.apply_to(&current);
        let moved = patch.moves_slot(&current);
        if moved && next.status.is_active() {
            self.availability
                .ensure_available(&next.table_number, next.date, next.time, cancel)
                .await?;
        }
        if patch.table_number.is_some() || patch.guests.is_some() {
            let table = self.table_by_number(&next.table_number, cancel).await?;
            check_capacity(&table, next.guests)?;
        }

        let store = self.store.clone();
        let cache = self.cache.clone();
        let updated = commit(cancel, async move {
            let updated = store
                .update_reservation(id, &patch)
                .await
                .map_err(slot_conflict)?;
            if moved {
                cache
                    .invalidate_reservation_write(&[&updated, &current])
                    .await;
            } else {
                cache.invalidate_reservation_write(&[&updated]).await;
            }
            Ok(updated)
        })
        .await
        .inspect_err(|e| log_store_failure("update_reservation", e))?;

        tracing::info!(reservation_id = %id, moved, "reservation updated");
        Ok(updated)
    }

    /// Move a reservation along its lifecycle. Re-applying the current
    /// status is a no-op.
    pub async fn update_reservation_status(
        &self,
        id: EntityId,
        status: ReservationStatus,
        cancel: &CancellationToken,
    ) -> EngineResult<Reservation> {
        let current = self.load(id, cancel).await?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("Cannot change status from {} to {}", current.status, status),
            }
            .into());
        }

        let store = self.store.clone();
        let cache = self.cache.clone();
        let updated = commit(cancel, async move {
            let updated = store
                .update_reservation_status(id, status)
                .await
                .map_err(slot_conflict)?;
            cache.invalidate_reservation_write(&[&updated]).await;
            Ok(updated)
        })
        .await
        .inspect_err(|e| log_store_failure("update_reservation_status", e))?;

        tracing::info!(
            reservation_id = %id,
            from = %current.status,
            to = %status,
            "reservation status changed"
        );
        Ok(updated)
    }

    /// Remove a reservation, returning what was removed.
    pub async fn delete_reservation(
        &self,
        id: EntityId,
        cancel: &CancellationToken,
    ) -> EngineResult<Reservation> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let removed = commit(cancel, async move {
            let removed = store.delete_reservation(id).await?;
            cache.invalidate_reservation_write(&[&removed]).await;
            Ok(removed)
        })
        .await
        .inspect_err(|e| log_store_failure("delete_reservation", e))?;

        tracing::info!(reservation_id = %id, "reservation deleted");
        Ok(removed)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn get_reservation(
        &self,
        id: EntityId,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Reservation>> {
        let store = &self.store;
        cancellable(
            cancel,
            self.cache
                .reservations()
                .by_id(id, freshness, || store.get_reservation(id)),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("reservation", id))
    }

    /// Every reservation owned by `user_id`, newest slot first.
    pub async fn user_reservations(
        &self,
        user_id: EntityId,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<Reservation>>> {
        let store = &self.store;
        let filter = ReservationFilter::for_owner(user_id);
        cancellable(
            cancel,
            self.cache
                .reservations()
                .for_user(user_id, freshness, || store.list_reservations(&filter)),
        )
        .await
    }

    /// Reservations matching `filter`, newest slot first.
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<Reservation>>> {
        let store = &self.store;
        cancellable(
            cancel,
            self.cache
                .reservations()
                .list(filter, freshness, || store.list_reservations(filter)),
        )
        .await
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Current state straight from the store, for deciding a write.
    async fn load(&self, id: EntityId, cancel: &CancellationToken) -> EngineResult<Reservation> {
        cancellable(cancel, self.store.get_reservation(id))
            .await?
            .ok_or_else(|| EngineError::not_found("reservation", id))
    }

    /// The table a reservation names. An unknown number is the caller's
    /// mistake, so it is a validation error rather than NotFound.
    async fn table_by_number(
        &self,
        number: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<Table> {
        let store = &self.store;
        let by = TableRef::Number(number.to_string());
        let found = cancellable(
            cancel,
            self.cache
                .tables()
                .by_number(number, Freshness::BestEffort, || store.get_table(&by)),
        )
        .await?;
        match found {
            Some(read) => Ok(read.into_value()),
            None => Err(ValidationError::InvalidValue {
                field: "tableNumber".to_string(),
                reason: format!("Table {} does not exist", number),
            }
            .into()),
        }
    }
}

fn check_capacity(table: &Table, guests: i32) -> EngineResult<()> {
    if guests > table.capacity {
        let mut errors = FieldErrors::new();
        errors.add(
            "guests",
            format!("Table {} seats at most {} guests", table.number, table.capacity),
        );
        errors.into_result()?;
    }
    Ok(())
}
