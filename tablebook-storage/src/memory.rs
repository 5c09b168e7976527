//! In-memory record store.
//!
//! Holds everything in process behind `RwLock`s. The active-slot uniqueness
//! check and the insert happen under one write lock, so concurrent creates
//! for the same slot behave like the database's partial unique index.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tablebook_core::{
    new_entity_id, EngineResult, EntityId, MonthCounts, MonthWindow, NewReservation, NewTable,
    NewUser, PeakSlot, PopularTable, Reservation, ReservationFilter, ReservationPatch,
    ReservationStatus, SlotTime, StorageError, Table, TableAvailabilityFilter, User, UserPatch,
    ValidationError, YearMonth,
};

use crate::store::{RecordStore, TableRef};

/// In-memory implementation of [`RecordStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<HashMap<EntityId, Table>>>,
    reservations: Arc<RwLock<HashMap<EntityId, Reservation>>>,
    users: Arc<RwLock<HashMap<EntityId, User>>>,
    offline: Arc<AtomicBool>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::Unavailable {
        reason: "storage lock poisoned".to_string(),
    })
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::Unavailable {
        reason: "storage lock poisoned".to_string(),
    })
}

fn slot_taken(table_number: &str, date: NaiveDate, time: SlotTime) -> StorageError {
    StorageError::SlotTaken {
        table_number: table_number.to_string(),
        date,
        time,
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StorageError::Unavailable`
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored reservations, any status.
    pub fn reservation_count(&self) -> usize {
        self.reservations.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Overwrite a reservation wholesale, bypassing lifecycle rules.
    /// Intended for seeding history in tests.
    pub fn insert_reservation_raw(&self, reservation: Reservation) -> EngineResult<()> {
        let mut reservations = write(&self.reservations)?;
        if reservation.status.is_active() {
            let (table, date, time) = reservation.slot();
            let taken = reservations
                .values()
                .any(|r| r.id != reservation.id && r.occupies(table, date, time));
            if taken {
                return Err(slot_taken(table, date, time).into());
            }
        }
        reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn ensure_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable {
                reason: "in-memory store offline".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn completed_in(&self, window: MonthWindow) -> EngineResult<Vec<Reservation>> {
        let reservations = read(&self.reservations)?;
        Ok(reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Completed && window.contains(r.date))
            .cloned()
            .collect())
    }
}

fn counts_of<'a>(reservations: impl Iterator<Item = &'a Reservation>) -> MonthCounts {
    let mut counts = MonthCounts::default();
    for r in reservations {
        counts.total += 1;
        match r.status {
            ReservationStatus::Completed => counts.completed += 1,
            ReservationStatus::Cancelled => counts.cancelled += 1,
            _ => {}
        }
    }
    counts
}

/// Rank `(key, count)` pairs by count descending, then key ascending.
fn rank<K: Ord>(counts: BTreeMap<K, i64>, limit: usize) -> Vec<(K, i64)> {
    let mut ranked: Vec<(K, i64)> = counts.into_iter().collect();
    // BTreeMap iteration is key-ascending and the sort is stable.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_table(&self, table: &NewTable) -> EngineResult<Table> {
        self.ensure_online()?;
        // Mirrors the CHECK constraint on the SQL schema.
        if table.capacity <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "capacity".to_string(),
                reason: "Capacity must be greater than 0".to_string(),
            }
            .into());
        }
        let mut tables = write(&self.tables)?;
        if tables.values().any(|t| t.number == table.number) {
            return Err(StorageError::Duplicate {
                entity: "table",
                reason: format!("number {} already exists", table.number),
            }
            .into());
        }
        let now = Utc::now();
        let created = Table {
            id: new_entity_id(),
            number: table.number.clone(),
            capacity: table.capacity,
            is_available: true,
            location: table.location,
            created_at: now,
            updated_at: now,
        };
        tables.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_table(&self, by: &TableRef) -> EngineResult<Option<Table>> {
        self.ensure_online()?;
        let tables = read(&self.tables)?;
        Ok(match by {
            TableRef::Id(id) => tables.get(id).cloned(),
            TableRef::Number(number) => tables.values().find(|t| &t.number == number).cloned(),
        })
    }

    async fn list_tables(&self) -> EngineResult<Vec<Table>> {
        self.ensure_online()?;
        let mut list: Vec<Table> = read(&self.tables)?.values().cloned().collect();
        list.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(list)
    }

    async fn list_available_tables(
        &self,
        filter: &TableAvailabilityFilter,
    ) -> EngineResult<Vec<Table>> {
        self.ensure_online()?;
        let tables = read(&self.tables)?;
        let reservations = read(&self.reservations)?;
        let mut list: Vec<Table> = tables
            .values()
            .filter(|t| filter.admits_table(t))
            .filter(|t| {
                !filter.consults_reservations()
                    || !reservations.values().any(|r| {
                        r.status.is_active()
                            && r.table_number == t.number
                            && filter.blocked_by(r.date, r.time)
                    })
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(list)
    }

    async fn update_table_availability(
        &self,
        id: EntityId,
        is_available: bool,
    ) -> EngineResult<Table> {
        self.ensure_online()?;
        let mut tables = write(&self.tables)?;
        let table = tables.get_mut(&id).ok_or_else(|| StorageError::NotFound {
            entity: "table",
            key: id.to_string(),
        })?;
        table.is_available = is_available;
        table.updated_at = Utc::now();
        Ok(table.clone())
    }

    async fn create_reservation(&self, new: &NewReservation) -> EngineResult<Reservation> {
        self.ensure_online()?;
        let mut reservations = write(&self.reservations)?;
        if reservations
            .values()
            .any(|r| r.occupies(&new.table_number, new.date, new.time))
        {
            return Err(slot_taken(&new.table_number, new.date, new.time).into());
        }
        let now = Utc::now();
        let created = Reservation {
            id: new_entity_id(),
            user_id: new.user_id,
            guest_name: new.guest_name.clone(),
            guest_phone: new.guest_phone.clone(),
            guest_email: new.guest_email.clone(),
            date: new.date,
            time: new.time,
            guests: new.guests,
            table_number: new.table_number.clone(),
            status: ReservationStatus::Pending,
            special_requests: new.special_requests.clone(),
            created_at: now,
            updated_at: now,
        };
        reservations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_reservation(&self, id: EntityId) -> EngineResult<Option<Reservation>> {
        self.ensure_online()?;
        Ok(read(&self.reservations)?.get(&id).cloned())
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> EngineResult<Vec<Reservation>> {
        self.ensure_online()?;
        let mut list: Vec<Reservation> = read(&self.reservations)?
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(b.time.cmp(&a.time))
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(list)
    }

    async fn update_reservation(
        &self,
        id: EntityId,
        patch: &ReservationPatch,
    ) -> EngineResult<Reservation> {
        self.ensure_online()?;
        let mut reservations = write(&self.reservations)?;
        let current = reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "reservation",
                key: id.to_string(),
            })?;
        let mut next = patch.apply_to(&current);
        if next.status.is_active() && patch.moves_slot(&current) {
            let (table, date, time) = next.slot();
            if reservations
                .values()
                .any(|r| r.id != id && r.occupies(table, date, time))
            {
                return Err(slot_taken(table, date, time).into());
            }
        }
        next.updated_at = Utc::now();
        reservations.insert(id, next.clone());
        Ok(next)
    }

    async fn update_reservation_status(
        &self,
        id: EntityId,
        status: ReservationStatus,
    ) -> EngineResult<Reservation> {
        self.ensure_online()?;
        let mut reservations = write(&self.reservations)?;
        let current = reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "reservation",
                key: id.to_string(),
            })?;
        if status.is_active() && !current.status.is_active() {
            let (table, date, time) = current.slot();
            if reservations
                .values()
                .any(|r| r.id != id && r.occupies(table, date, time))
            {
                return Err(slot_taken(table, date, time).into());
            }
        }
        let mut next = current;
        next.status = status;
        next.updated_at = Utc::now();
        reservations.insert(id, next.clone());
        Ok(next)
    }

    async fn delete_reservation(&self, id: EntityId) -> EngineResult<Reservation> {
        self.ensure_online()?;
        write(&self.reservations)?.remove(&id).ok_or_else(|| {
            StorageError::NotFound {
                entity: "reservation",
                key: id.to_string(),
            }
            .into()
        })
    }

    async fn check_conflict(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
    ) -> EngineResult<bool> {
        self.ensure_online()?;
        Ok(read(&self.reservations)?
            .values()
            .any(|r| r.occupies(table_number, date, time)))
    }

    async fn aggregate_overview(&self) -> EngineResult<Vec<(YearMonth, MonthCounts)>> {
        self.ensure_online()?;
        let reservations = read(&self.reservations)?;
        let mut by_month: BTreeMap<YearMonth, Vec<&Reservation>> = BTreeMap::new();
        for r in reservations.values() {
            by_month.entry(YearMonth::of(r.date)).or_default().push(r);
        }
        Ok(by_month
            .into_iter()
            .rev()
            .map(|(month, rs)| (month, counts_of(rs.into_iter())))
            .collect())
    }

    async fn aggregate_monthly(&self, window: MonthWindow) -> EngineResult<MonthCounts> {
        self.ensure_online()?;
        let reservations = read(&self.reservations)?;
        Ok(counts_of(
            reservations.values().filter(|r| window.contains(r.date)),
        ))
    }

    async fn aggregate_popular_tables(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PopularTable>> {
        self.ensure_online()?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for r in self.completed_in(window)? {
            *counts.entry(r.table_number).or_default() += 1;
        }
        Ok(rank(counts, limit)
            .into_iter()
            .map(|(table_number, count)| PopularTable {
                table_number,
                count,
            })
            .collect())
    }

    async fn aggregate_peak_slots(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PeakSlot>> {
        self.ensure_online()?;
        let mut counts: BTreeMap<SlotTime, i64> = BTreeMap::new();
        for r in self.completed_in(window)? {
            *counts.entry(r.time).or_default() += 1;
        }
        Ok(rank(counts, limit)
            .into_iter()
            .map(|(time, count)| PeakSlot { time, count })
            .collect())
    }

    async fn create_user(&self, user: &NewUser) -> EngineResult<User> {
        self.ensure_online()?;
        let mut users = write(&self.users)?;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StorageError::Duplicate {
                entity: "user",
                reason: format!("email {} already registered", user.email),
            }
            .into());
        }
        let now = Utc::now();
        let created = User {
            id: new_entity_id(),
            email: user.email.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            photo: None,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: EntityId) -> EngineResult<Option<User>> {
        self.ensure_online()?;
        Ok(read(&self.users)?.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> EngineResult<Option<User>> {
        self.ensure_online()?;
        Ok(read(&self.users)?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, id: EntityId, patch: &UserPatch) -> EngineResult<User> {
        self.ensure_online()?;
        let mut users = write(&self.users)?;
        if let Some(email) = &patch.email {
            if users
                .values()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email))
            {
                return Err(StorageError::Duplicate {
                    entity: "user",
                    reason: format!("email {} already registered", email),
                }
                .into());
            }
        }
        let user = users.get_mut(&id).ok_or_else(|| StorageError::NotFound {
            entity: "user",
            key: id.to_string(),
        })?;
        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(phone) = &patch.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(photo) = &patch.photo {
            user.photo = Some(photo.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablebook_core::{EngineError, TableLocation};
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> SlotTime {
        SlotTime::from_hm(h, m).unwrap()
    }

    fn booking(table: &str, date: NaiveDate, time: SlotTime) -> NewReservation {
        NewReservation {
            user_id: Uuid::now_v7(),
            guest_name: "Ada".to_string(),
            guest_phone: "555-0100".to_string(),
            guest_email: "ada@example.com".to_string(),
            date,
            time,
            guests: 2,
            table_number: table.to_string(),
            special_requests: None,
        }
    }

    async fn seed_tables(store: &InMemoryRecordStore) -> Vec<Table> {
        let mut out = Vec::new();
        for (number, capacity) in [("T1", 2), ("T2", 4), ("T3", 6)] {
            out.push(
                store
                    .create_table(&NewTable {
                        number: number.to_string(),
                        capacity,
                        location: TableLocation::Main,
                    })
                    .await
                    .unwrap(),
            );
        }
        out
    }

    #[tokio::test]
    async fn test_table_without_seats_rejected() {
        let store = InMemoryRecordStore::new();
        let err = store
            .create_table(&NewTable {
                number: "T0".to_string(),
                capacity: 0,
                location: TableLocation::Main,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.field_errors().unwrap().get("capacity"),
            Some("Capacity must be greater than 0")
        );
        assert!(store.list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_active_slot_rejected() {
        let store = InMemoryRecordStore::new();
        let slot = booking("T1", d(2025, 12, 25), t(19, 0));
        store.create_reservation(&slot).await.unwrap();
        let err = store.create_reservation(&slot).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Storage(StorageError::SlotTaken { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let store = InMemoryRecordStore::new();
        let slot = booking("T1", d(2025, 12, 25), t(19, 0));
        let first = store.create_reservation(&slot).await.unwrap();
        store
            .update_reservation_status(first.id, ReservationStatus::Cancelled)
            .await
            .unwrap();
        assert!(!store
            .check_conflict("T1", d(2025, 12, 25), t(19, 0))
            .await
            .unwrap());
        store.create_reservation(&slot).await.unwrap();
    }

    #[tokio::test]
    async fn test_patch_into_taken_slot_rejected() {
        let store = InMemoryRecordStore::new();
        store
            .create_reservation(&booking("T1", d(2025, 12, 25), t(19, 0)))
            .await
            .unwrap();
        let other = store
            .create_reservation(&booking("T1", d(2025, 12, 25), t(20, 0)))
            .await
            .unwrap();
        let patch = ReservationPatch {
            time: Some(t(19, 0)),
            ..Default::default()
        };
        let err = store.update_reservation(other.id, &patch).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Storage(StorageError::SlotTaken { .. })
        ));
    }

    #[tokio::test]
    async fn test_available_tables_date_only_excludes_whole_day() {
        let store = InMemoryRecordStore::new();
        seed_tables(&store).await;
        store
            .create_reservation(&booking("T2", d(2025, 12, 25), t(12, 0)))
            .await
            .unwrap();

        let slot = TableAvailabilityFilter::for_slot(d(2025, 12, 25), t(19, 0));
        let numbers: Vec<String> = store
            .list_available_tables(&slot)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.number)
            .collect();
        assert_eq!(numbers, vec!["T1", "T2", "T3"]);

        let day = TableAvailabilityFilter::on_date(d(2025, 12, 25));
        let numbers: Vec<String> = store
            .list_available_tables(&day)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.number)
            .collect();
        assert_eq!(numbers, vec!["T1", "T3"]);
    }

    #[tokio::test]
    async fn test_available_tables_capacity_and_flag() {
        let store = InMemoryRecordStore::new();
        let tables = seed_tables(&store).await;
        store
            .update_table_availability(tables[2].id, false)
            .await
            .unwrap();
        let filter = TableAvailabilityFilter::default().with_guests(3);
        let numbers: Vec<String> = store
            .list_available_tables(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.number)
            .collect();
        assert_eq!(numbers, vec!["T2"]);
    }

    #[tokio::test]
    async fn test_month_aggregate_last_day_boundaries() {
        let store = InMemoryRecordStore::new();
        for date in [d(2024, 2, 29), d(2025, 4, 30), d(2025, 1, 31), d(2023, 2, 28)] {
            store
                .create_reservation(&booking("T1", date, t(19, 0)))
                .await
                .unwrap();
        }
        for (y, m) in [(2024, 2), (2025, 4), (2025, 1), (2023, 2)] {
            let ym = YearMonth::new(y, m).unwrap();
            assert_eq!(store.aggregate_monthly(ym.window()).await.unwrap().total, 1);
            assert_eq!(
                store.aggregate_monthly(ym.succ().window()).await.unwrap().total,
                0
            );
        }
    }

    #[tokio::test]
    async fn test_popular_tables_completed_only_with_tiebreak() {
        let store = InMemoryRecordStore::new();
        let seed = |table: &str, day: u32, status: ReservationStatus| {
            let now = Utc::now();
            store
                .insert_reservation_raw(Reservation {
                    id: new_entity_id(),
                    user_id: Uuid::now_v7(),
                    guest_name: "G".to_string(),
                    guest_phone: "1".to_string(),
                    guest_email: "g@example.com".to_string(),
                    date: d(2025, 12, day),
                    time: t(19, 0),
                    guests: 2,
                    table_number: table.to_string(),
                    status,
                    special_requests: None,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        };
        seed("T3", 1, ReservationStatus::Completed);
        seed("T2", 2, ReservationStatus::Completed);
        seed("T1", 3, ReservationStatus::Cancelled);
        seed("T1", 4, ReservationStatus::Pending);

        let window = YearMonth::new(2025, 12).unwrap().window();
        let popular = store.aggregate_popular_tables(window, 10).await.unwrap();
        let numbers: Vec<&str> = popular.iter().map(|p| p.table_number.as_str()).collect();
        assert_eq!(numbers, vec!["T2", "T3"]);

        let counts = store.aggregate_monthly(window).await.unwrap();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.cancelled, 1);
    }

    #[tokio::test]
    async fn test_offline_is_unavailable_not_none() {
        let store = InMemoryRecordStore::new();
        store.set_offline(true);
        let err = store.get_reservation(Uuid::now_v7()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store.delete_reservation(Uuid::now_v7()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_user_email_unique_case_insensitive() {
        let store = InMemoryRecordStore::new();
        let user = NewUser {
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            phone: None,
            role: Default::default(),
        };
        store.create_user(&user).await.unwrap();
        let mut shouting = user.clone();
        shouting.email = "ADA@example.com".to_string();
        assert!(store.create_user(&shouting).await.is_err());
        assert!(store
            .get_user_by_email("Ada@Example.com")
            .await
            .unwrap()
            .is_some());
    }
}
