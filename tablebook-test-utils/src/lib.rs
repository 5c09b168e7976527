//! Tablebook Test Utilities
//!
//! Shared test infrastructure for the tablebook workspace:
//! - Instrumented and failing doubles for the store and cache seams
//! - Proptest generators for entity and request types
//! - Fixtures for common booking scenarios
//! - Assertions over `EngineResult`

pub use tablebook_storage::{InMemoryCacheStore, InMemoryRecordStore};

pub use tablebook_core::{
    CacheError, EngineError, EngineResult, EntityId, MonthCounts, MonthWindow, NewReservation,
    NewTable, NewUser, PeakSlot, PopularTable, Reservation, ReservationFilter, ReservationPatch,
    ReservationRequest, ReservationStatus, SlotTime, StorageError, Table,
    TableAvailabilityFilter, TableLocation, User, UserPatch, UserRole, YearMonth,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tablebook_storage::{CacheStats, CacheStore, RecordStore, TableRef};

// ============================================================================
// TEST DOUBLES
// ============================================================================

/// Cache store whose every operation fails, as if the backend were down.
#[derive(Debug, Default)]
pub struct FailingCacheStore {
    attempts: AtomicU64,
}

impl FailingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many operations were attempted against the broken backend.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".to_string()))
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
        self.fail()
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.fail()
    }
}

/// Record store wrapper that counts calls per operation before delegating.
///
/// Used to tell cache hits from store round-trips.
pub struct CountingRecordStore<S> {
    inner: S,
    calls: Mutex<HashMap<&'static str, u64>>,
}

impl<S: RecordStore> CountingRecordStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls made to `operation` so far, named after the trait method.
    pub fn calls(&self, operation: &str) -> u64 {
        self.calls
            .lock()
            .map(|c| c.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, operation: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(operation).or_insert(0) += 1;
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for CountingRecordStore<S> {
    async fn create_table(&self, table: &NewTable) -> EngineResult<Table> {
        self.record("create_table");
        self.inner.create_table(table).await
    }

    async fn get_table(&self, by: &TableRef) -> EngineResult<Option<Table>> {
        self.record("get_table");
        self.inner.get_table(by).await
    }

    async fn list_tables(&self) -> EngineResult<Vec<Table>> {
        self.record("list_tables");
        self.inner.list_tables().await
    }

    async fn list_available_tables(
        &self,
        filter: &TableAvailabilityFilter,
    ) -> EngineResult<Vec<Table>> {
        self.record("list_available_tables");
        self.inner.list_available_tables(filter).await
    }

    async fn update_table_availability(
        &self,
        id: EntityId,
        is_available: bool,
    ) -> EngineResult<Table> {
        self.record("update_table_availability");
        self.inner.update_table_availability(id, is_available).await
    }

    async fn create_reservation(&self, reservation: &NewReservation) -> EngineResult<Reservation> {
        self.record("create_reservation");
        self.inner.create_reservation(reservation).await
    }

    async fn get_reservation(&self, id: EntityId) -> EngineResult<Option<Reservation>> {
        self.record("get_reservation");
        self.inner.get_reservation(id).await
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> EngineResult<Vec<Reservation>> {
        self.record("list_reservations");
        self.inner.list_reservations(filter).await
    }

    async fn update_reservation(
        &self,
        id: EntityId,
        patch: &ReservationPatch,
    ) -> EngineResult<Reservation> {
        self.record("update_reservation");
        self.inner.update_reservation(id, patch).await
    }

    async fn update_reservation_status(
        &self,
        id: EntityId,
        status: ReservationStatus,
    ) -> EngineResult<Reservation> {
        self.record("update_reservation_status");
        self.inner.update_reservation_status(id, status).await
    }

    async fn delete_reservation(&self, id: EntityId) -> EngineResult<Reservation> {
        self.record("delete_reservation");
        self.inner.delete_reservation(id).await
    }

    async fn check_conflict(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
    ) -> EngineResult<bool> {
        self.record("check_conflict");
        self.inner.check_conflict(table_number, date, time).await
    }

    async fn aggregate_overview(&self) -> EngineResult<Vec<(YearMonth, MonthCounts)>> {
        self.record("aggregate_overview");
        self.inner.aggregate_overview().await
    }

    async fn aggregate_monthly(&self, window: MonthWindow) -> EngineResult<MonthCounts> {
        self.record("aggregate_monthly");
        self.inner.aggregate_monthly(window).await
    }

    async fn aggregate_popular_tables(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PopularTable>> {
        self.record("aggregate_popular_tables");
        self.inner.aggregate_popular_tables(window, limit).await
    }

    async fn aggregate_peak_slots(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PeakSlot>> {
        self.record("aggregate_peak_slots");
        self.inner.aggregate_peak_slots(window, limit).await
    }

    async fn create_user(&self, user: &NewUser) -> EngineResult<User> {
        self.record("create_user");
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: EntityId) -> EngineResult<Option<User>> {
        self.record("get_user");
        self.inner.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> EngineResult<Option<User>> {
        self.record("get_user_by_email");
        self.inner.get_user_by_email(email).await
    }

    async fn update_user(&self, id: EntityId, patch: &UserPatch) -> EngineResult<User> {
        self.record("update_user");
        self.inner.update_user(id, patch).await
    }
}

/// Convenience for tests that share one counting store with the engine.
pub fn counting_memory_store() -> Arc<CountingRecordStore<InMemoryRecordStore>> {
    Arc::new(CountingRecordStore::new(InMemoryRecordStore::new()))
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tablebook types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2031, 1u32..13, 1u32..29)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    /// Any calendar day, including the 29th to 31st.
    pub fn arb_any_date() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2031, 1u32..13, 1u32..32)
            .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    }

    /// Half-hour dinner slots between 17:00 and 22:30.
    pub fn arb_dinner_slot() -> impl Strategy<Value = SlotTime> {
        (17u32..23, prop_oneof![Just(0u32), Just(30u32)])
            .prop_filter_map("valid slot", |(h, m)| SlotTime::from_hm(h, m))
    }

    pub fn arb_slot_time() -> impl Strategy<Value = SlotTime> {
        (0u32..24, 0u32..60).prop_filter_map("valid slot", |(h, m)| SlotTime::from_hm(h, m))
    }

    pub fn arb_table_number() -> impl Strategy<Value = String> {
        (1u32..10).prop_map(|n| format!("T{}", n))
    }

    pub fn arb_status() -> impl Strategy<Value = ReservationStatus> {
        prop_oneof![
            Just(ReservationStatus::Pending),
            Just(ReservationStatus::Confirmed),
            Just(ReservationStatus::Completed),
            Just(ReservationStatus::Cancelled),
        ]
    }

    pub fn arb_location() -> impl Strategy<Value = TableLocation> {
        prop_oneof![
            Just(TableLocation::Main),
            Just(TableLocation::Terrace),
            Just(TableLocation::Private),
        ]
    }

    pub fn arb_new_table() -> impl Strategy<Value = NewTable> {
        (arb_table_number(), 1i32..13, arb_location()).prop_map(|(number, capacity, location)| {
            NewTable {
                number,
                capacity,
                location,
            }
        })
    }

    /// A request that passes validation.
    pub fn arb_valid_request() -> impl Strategy<Value = ReservationRequest> {
        (
            "[A-Z][a-z]{2,10}",
            "[0-9]{3}-[0-9]{4}",
            "[a-z]{3,8}",
            arb_date(),
            arb_dinner_slot(),
            1i32..9,
            arb_table_number(),
        )
            .prop_map(|(name, phone, local, date, time, guests, table_number)| {
                ReservationRequest {
                    guest_email: format!("{}@example.com", local),
                    guest_name: name,
                    guest_phone: phone,
                    date: date.to_string(),
                    time: time.to_string(),
                    guests,
                    table_number,
                    special_requests: None,
                }
            })
    }

    /// A stored reservation in any status.
    pub fn arb_reservation(user_id: EntityId) -> impl Strategy<Value = Reservation> {
        (
            arb_any_date(),
            arb_dinner_slot(),
            arb_table_number(),
            arb_status(),
            1i32..9,
        )
            .prop_map(move |(date, time, table_number, status, guests)| {
                let mut r = fixtures::reservation_on(user_id, &table_number, date, time);
                r.status = status;
                r.guests = guests;
                r
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common booking scenarios.

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    /// `"HH:MM"` as a slot. Falls back to midnight on bad input.
    pub fn slot(hhmm: &str) -> SlotTime {
        hhmm.parse()
            .unwrap_or_else(|_| SlotTime::from_naive(chrono::NaiveTime::MIN))
    }

    pub fn new_table(number: &str, capacity: i32) -> NewTable {
        NewTable {
            number: number.to_string(),
            capacity,
            location: TableLocation::Main,
        }
    }

    pub fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Test Guest".to_string(),
            phone: Some("555-0100".to_string()),
            role: UserRole::User,
        }
    }

    /// A request for `table` on `date` at `time` that passes validation.
    pub fn request(table: &str, date: &str, time: &str, guests: i32) -> ReservationRequest {
        ReservationRequest {
            guest_name: "Ada Lovelace".to_string(),
            guest_phone: "555-0100".to_string(),
            guest_email: "ada@example.com".to_string(),
            date: date.to_string(),
            time: time.to_string(),
            guests,
            table_number: table.to_string(),
            special_requests: None,
        }
    }

    /// A pending reservation on an exact slot, not yet stored.
    pub fn reservation_on(
        user_id: EntityId,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
    ) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::now_v7(),
            user_id,
            guest_name: "Ada Lovelace".to_string(),
            guest_phone: "555-0100".to_string(),
            guest_email: "ada@example.com".to_string(),
            date,
            time,
            guests: 2,
            table_number: table_number.to_string(),
            status: ReservationStatus::Pending,
            special_requests: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a reservation in `status` directly into the store.
    pub fn seed(
        store: &InMemoryRecordStore,
        table_number: &str,
        date: NaiveDate,
        time: &str,
        status: ReservationStatus,
    ) -> Reservation {
        let mut r = reservation_on(Uuid::now_v7(), table_number, date, slot(time));
        r.status = status;
        // Callers seed non-overlapping history; a clash is a broken fixture.
        if let Err(e) = store.insert_reservation_raw(r.clone()) {
            panic!("fixture seed failed: {}", e);
        }
        r
    }

    /// A store holding tables T1 (2 seats), T2 (4 seats) and T3 (8 seats).
    pub async fn store_with_tables() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        for (number, capacity) in [("T1", 2), ("T2", 4), ("T3", 8)] {
            if let Err(e) = store.create_table(&new_table(number, capacity)).await {
                panic!("fixture table {} failed: {}", number, e);
            }
        }
        store
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over engine results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &EngineResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a slot conflict scoped to the `tableNumber` field.
    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(e @ EngineError::Conflict(_)) => {
                let details = e.field_errors().unwrap_or_default();
                assert_eq!(
                    details.get("tableNumber"),
                    Some("Table not available at this time")
                );
            }
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    /// Assert a validation failure that names `field`.
    #[track_caller]
    pub fn assert_validation_field<T: std::fmt::Debug>(result: &EngineResult<T>, field: &str) {
        match result {
            Err(e @ EngineError::Validation(_)) => {
                let details = e.field_errors().unwrap_or_default();
                assert!(
                    details.contains(field),
                    "Expected validation error on {}, got: {}",
                    field,
                    details
                );
            }
            other => panic!("Expected Validation error on {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(e) if e.is_not_found() => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_transient<T: std::fmt::Debug>(result: &EngineResult<T>) {
        match result {
            Err(e) if e.is_transient() => {}
            other => panic!("Expected transient storage error, got: {:?}", other),
        }
    }
}
