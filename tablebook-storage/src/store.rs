//! Record store contract.
//!
//! The record store is the durable source of truth for tables, reservations
//! and users. Everything the cache holds is derived from it.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use tablebook_core::{
    EngineResult, EntityId, MonthCounts, MonthWindow, NewReservation, NewTable, NewUser,
    PeakSlot, PopularTable, Reservation, ReservationFilter, ReservationPatch, ReservationStatus,
    SlotTime, Table, TableAvailabilityFilter, User, UserPatch, YearMonth,
};

/// Lookup key for a single table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableRef {
    Id(EntityId),
    Number(String),
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Id(id) => write!(f, "{}", id),
            TableRef::Number(number) => f.write_str(number),
        }
    }
}

/// Durable store of tables, reservations and users.
///
/// Contract shared by every implementation:
/// - `get_*` returns `Ok(None)` for an absent entity; mutations of an absent
///   entity return `StorageError::NotFound`.
/// - An unreachable store returns `StorageError::Unavailable`, never `None`.
/// - At most one reservation with an active status may exist per
///   (table number, date, time). A write that would break this returns
///   `StorageError::SlotTaken`, whatever the caller checked beforehand.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // TABLE OPERATIONS
    // ========================================================================

    /// Create a table. Table numbers are unique.
    async fn create_table(&self, table: &NewTable) -> EngineResult<Table>;

    async fn get_table(&self, by: &TableRef) -> EngineResult<Option<Table>>;

    /// All tables ordered by number.
    async fn list_tables(&self) -> EngineResult<Vec<Table>>;

    /// Tables matching `filter`, ordered by number.
    async fn list_available_tables(
        &self,
        filter: &TableAvailabilityFilter,
    ) -> EngineResult<Vec<Table>>;

    async fn update_table_availability(
        &self,
        id: EntityId,
        is_available: bool,
    ) -> EngineResult<Table>;

    // ========================================================================
    // RESERVATION OPERATIONS
    // ========================================================================

    /// Insert a new reservation in status pending.
    async fn create_reservation(&self, reservation: &NewReservation) -> EngineResult<Reservation>;

    async fn get_reservation(&self, id: EntityId) -> EngineResult<Option<Reservation>>;

    /// Reservations matching `filter`, newest slot first (date, then time, descending).
    async fn list_reservations(&self, filter: &ReservationFilter)
        -> EngineResult<Vec<Reservation>>;

    /// Write the fields set in `patch`.
    async fn update_reservation(
        &self,
        id: EntityId,
        patch: &ReservationPatch,
    ) -> EngineResult<Reservation>;

    async fn update_reservation_status(
        &self,
        id: EntityId,
        status: ReservationStatus,
    ) -> EngineResult<Reservation>;

    /// Remove a reservation, returning what was removed.
    async fn delete_reservation(&self, id: EntityId) -> EngineResult<Reservation>;

    /// Whether an active reservation already holds the exact slot.
    async fn check_conflict(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
    ) -> EngineResult<bool>;

    // ========================================================================
    // AGGREGATES
    // ========================================================================

    /// Counts for every month with at least one reservation, newest first.
    async fn aggregate_overview(&self) -> EngineResult<Vec<(YearMonth, MonthCounts)>>;

    async fn aggregate_monthly(&self, window: MonthWindow) -> EngineResult<MonthCounts>;

    /// Completed reservations per table number, by count descending then
    /// table number ascending, truncated to `limit`.
    async fn aggregate_popular_tables(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PopularTable>>;

    /// Completed reservations per exact stored time, by count descending
    /// then time ascending, truncated to `limit`.
    async fn aggregate_peak_slots(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PeakSlot>>;

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Create a user. E-mail addresses are unique, compared case-insensitively.
    async fn create_user(&self, user: &NewUser) -> EngineResult<User>;

    async fn get_user(&self, id: EntityId) -> EngineResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> EngineResult<Option<User>>;

    async fn update_user(&self, id: EntityId, patch: &UserPatch) -> EngineResult<User>;
}
