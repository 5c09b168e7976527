//! End-to-end booking, availability and reporting scenarios against the
//! in-memory store and cache.

use std::sync::Arc;
use tablebook_core::{
    EngineConfig, ReservationStatus, ReservationUpdate, TableAvailabilityFilter, YearMonth,
};
use tablebook_engine::{CancellationToken, Engine, Freshness};
use tablebook_storage::{InMemoryCacheStore, InMemoryRecordStore};
use tablebook_test_utils::assertions::assert_conflict;
use tablebook_test_utils::fixtures::{date, request, seed, slot, store_with_tables};
use tablebook_test_utils::{counting_memory_store, CountingRecordStore};
use uuid::Uuid;

struct World {
    engine: Engine,
    store: InMemoryRecordStore,
    cache: Arc<InMemoryCacheStore>,
}

async fn world() -> World {
    let store = store_with_tables().await;
    let cache = Arc::new(InMemoryCacheStore::new());
    let engine = Engine::new(
        Arc::new(store.clone()),
        cache.clone(),
        EngineConfig::default(),
    )
    .unwrap();
    World {
        engine,
        store,
        cache,
    }
}

#[tokio::test]
async fn test_second_booking_of_pending_slot_conflicts() {
    let w = world().await;
    let token = CancellationToken::new();

    let first = w
        .engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T1", "2025-12-25", "19:00", 2), &token)
        .await
        .unwrap();
    assert_eq!(first.status, ReservationStatus::Pending);

    let second = w
        .engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T1", "2025-12-25", "19:00", 2), &token)
        .await;
    assert_conflict(&second);
    assert_eq!(w.store.reservation_count(), 1);
}

#[tokio::test]
async fn test_cancelled_slot_is_available_again() {
    let w = world().await;
    let token = CancellationToken::new();
    let day = date(2025, 12, 25);

    let booked = w
        .engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T1", "2025-12-25", "19:00", 2), &token)
        .await
        .unwrap();
    assert!(!w
        .engine
        .availability
        .is_available("T1", day, slot("19:00"), &token)
        .await
        .unwrap());

    w.engine
        .bookings
        .update_reservation_status(booked.id, ReservationStatus::Cancelled, &token)
        .await
        .unwrap();
    assert!(w
        .engine
        .availability
        .is_available("T1", day, slot("19:00"), &token)
        .await
        .unwrap());

    // And the slot can be booked again.
    w.engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T1", "2025-12-25", "19:00", 2), &token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_month_detail_ranks_popular_tables() {
    let w = world().await;
    let token = CancellationToken::new();
    for (day, time) in [(1, "19:00"), (2, "19:00"), (3, "20:00")] {
        seed(&w.store, "T1", date(2025, 12, day), time, ReservationStatus::Completed);
    }
    seed(&w.store, "T2", date(2025, 12, 4), "19:00", ReservationStatus::Completed);
    seed(&w.store, "T3", date(2025, 12, 4), "19:00", ReservationStatus::Cancelled);

    let detail = w
        .engine
        .stats
        .month_detail("2025-12", Freshness::BestEffort, &token)
        .await
        .unwrap()
        .into_value();

    assert_eq!(detail.popular_tables[0].table_number, "T1");
    assert_eq!(detail.popular_tables[0].count, 3);
    assert_eq!(detail.popular_tables[1].table_number, "T2");
    assert_eq!(detail.popular_tables[1].count, 1);
    assert_eq!(detail.popular_tables.len(), 2);
    assert_eq!(detail.summary.completed_reservations, 4);
    assert_eq!(detail.summary.revenue, 200.0);
}

#[tokio::test]
async fn test_table_update_drops_cached_availability() {
    let w = world().await;
    let token = CancellationToken::new();
    let filter = TableAvailabilityFilter::for_slot(date(2025, 12, 25), slot("19:00")).with_guests(2);

    let before = w
        .engine
        .tables
        .list_available(&filter, Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert!(before.value().iter().any(|t| t.number == "T1"));
    w.engine
        .tables
        .list_tables(Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert!(w.cache.contains("tables:all"));
    assert!(w.cache.contains("tables:available:2025-12-25:19:00:2"));

    let t1 = w
        .engine
        .tables
        .get_table_by_number("T1", Freshness::BestEffort, &token)
        .await
        .unwrap()
        .into_value();
    w.engine
        .tables
        .update_table_availability(t1.id, false, &token)
        .await
        .unwrap();

    assert!(!w.cache.contains("tables:all"));
    assert!(!w.cache.contains("tables:available:2025-12-25:19:00:2"));
    assert!(!w.cache.contains("table:number:T1"));

    let after = w
        .engine
        .tables
        .list_available(&filter, Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert!(after.was_cache_miss());
    assert!(after.value().iter().all(|t| t.number != "T1"));
}

#[tokio::test]
async fn test_booking_drops_availability_for_that_day_only() {
    let w = world().await;
    let token = CancellationToken::new();
    let christmas = TableAvailabilityFilter::for_slot(date(2025, 12, 25), slot("19:00"));
    let boxing_day = TableAvailabilityFilter::for_slot(date(2025, 12, 26), slot("19:00"));
    for filter in [&christmas, &boxing_day] {
        w.engine
            .tables
            .list_available(filter, Freshness::BestEffort, &token)
            .await
            .unwrap();
    }

    w.engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T2", "2025-12-25", "19:00", 2), &token)
        .await
        .unwrap();

    assert!(!w.cache.contains("tables:available:2025-12-25:19:00:0"));
    assert!(w.cache.contains("tables:available:2025-12-26:19:00:0"));

    let fresh = w
        .engine
        .tables
        .list_available(&christmas, Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert!(fresh.value().iter().all(|t| t.number != "T2"));
}

#[tokio::test]
async fn test_read_after_write_matches_store() {
    let w = world().await;
    let token = CancellationToken::new();
    let owner = Uuid::now_v7();
    let booked = w
        .engine
        .bookings
        .create_reservation(owner, &request("T3", "2025-12-25", "19:00", 6), &token)
        .await
        .unwrap();

    // Warm every view of it.
    w.engine
        .bookings
        .get_reservation(booked.id, Freshness::BestEffort, &token)
        .await
        .unwrap();
    w.engine
        .bookings
        .user_reservations(owner, Freshness::BestEffort, &token)
        .await
        .unwrap();

    let updated = w
        .engine
        .bookings
        .update_reservation(
            booked.id,
            &ReservationUpdate {
                guests: Some(8),
                time: Some("20:00".to_string()),
                ..Default::default()
            },
            &token,
        )
        .await
        .unwrap();

    let read = w
        .engine
        .bookings
        .get_reservation(booked.id, Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert!(read.was_cache_miss());
    assert_eq!(read.value(), &updated);

    let mine = w
        .engine
        .bookings
        .user_reservations(owner, Freshness::BestEffort, &token)
        .await
        .unwrap()
        .into_value();
    assert_eq!(mine, vec![updated]);

    // The old slot is free again.
    assert!(w
        .engine
        .availability
        .is_available("T3", date(2025, 12, 25), slot("19:00"), &token)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_moving_onto_taken_slot_conflicts() {
    let w = world().await;
    let token = CancellationToken::new();
    w.engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T2", "2025-12-25", "19:00", 2), &token)
        .await
        .unwrap();
    let other = w
        .engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T2", "2025-12-25", "20:00", 2), &token)
        .await
        .unwrap();

    let result = w
        .engine
        .bookings
        .update_reservation(
            other.id,
            &ReservationUpdate {
                time: Some("19:00".to_string()),
                ..Default::default()
            },
            &token,
        )
        .await;
    assert_conflict(&result);
}

#[tokio::test]
async fn test_booking_drops_that_months_report() {
    let w = world().await;
    let token = CancellationToken::new();
    seed(&w.store, "T1", date(2025, 12, 1), "19:00", ReservationStatus::Completed);

    let before = w
        .engine
        .stats
        .month_detail("2025-12", Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert_eq!(before.value().summary.total_reservations, 1);
    w.engine
        .stats
        .monthly_overview(Freshness::BestEffort, &token)
        .await
        .unwrap();

    w.engine
        .bookings
        .create_reservation(Uuid::now_v7(), &request("T2", "2025-12-20", "19:00", 2), &token)
        .await
        .unwrap();
    assert!(!w.cache.contains("reports:monthly:2025-12"));
    assert!(!w.cache.contains("reports:monthly:list"));

    let after = w
        .engine
        .stats
        .month_detail("2025-12", Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert_eq!(after.value().summary.total_reservations, 2);
}

#[tokio::test]
async fn test_month_boundaries_by_calendar() {
    let w = world().await;
    let token = CancellationToken::new();
    let last_days = [(2025, 2, 28), (2024, 2, 29), (2025, 4, 30), (2025, 1, 31)];
    for (y, m, d) in last_days {
        seed(&w.store, "T1", date(y, m, d), "19:00", ReservationStatus::Completed);
    }

    for (y, m, _) in last_days {
        let month = YearMonth::new(y, m).unwrap();
        let detail = w
            .engine
            .stats
            .month_detail(&month.to_string(), Freshness::BestEffort, &token)
            .await
            .unwrap()
            .into_value();
        assert_eq!(detail.summary.total_reservations, 1, "month {}", month);

        let next = month.succ();
        let spill = w
            .engine
            .stats
            .month_detail(&next.to_string(), Freshness::BestEffort, &token)
            .await;
        if let Ok(next_detail) = spill {
            // Only a seeded month may follow, and it holds only its own day.
            assert_eq!(next_detail.value().summary.total_reservations, 1);
        }
    }
}

#[tokio::test]
async fn test_cache_hit_skips_store() {
    let store: Arc<CountingRecordStore<InMemoryRecordStore>> = counting_memory_store();
    let token = CancellationToken::new();
    let engine = Engine::new(
        store.clone(),
        Arc::new(InMemoryCacheStore::new()),
        EngineConfig::default(),
    )
    .unwrap();

    engine
        .tables
        .list_tables(Freshness::BestEffort, &token)
        .await
        .unwrap();
    engine
        .tables
        .list_tables(Freshness::BestEffort, &token)
        .await
        .unwrap();
    assert_eq!(store.calls("list_tables"), 1);

    engine
        .tables
        .list_tables(Freshness::Consistent, &token)
        .await
        .unwrap();
    assert_eq!(store.calls("list_tables"), 2);
}

#[tokio::test]
async fn test_booking_conflict_check_never_uses_cache() {
    let store = counting_memory_store();
    let token = CancellationToken::new();
    let engine = Engine::new(
        store.clone(),
        Arc::new(InMemoryCacheStore::new()),
        EngineConfig::default(),
    )
    .unwrap();
    let day = date(2025, 12, 25);
    for _ in 0..3 {
        engine
            .availability
            .is_available("T1", day, slot("19:00"), &token)
            .await
            .unwrap();
    }
    assert_eq!(store.calls("check_conflict"), 3);
}
