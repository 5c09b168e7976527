//! Property tests: whatever sequence of bookings, moves and status changes
//! runs, no two active reservations ever hold the same slot.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tablebook_core::{
    EngineConfig, EngineError, ReservationFilter, ReservationStatus, ReservationUpdate,
};
use tablebook_engine::{CancellationToken, Engine, Freshness};
use tablebook_storage::InMemoryCacheStore;
use tablebook_test_utils::fixtures::{request, store_with_tables};
use tablebook_test_utils::generators::arb_status;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Book { table: usize, day: u32, time: usize },
    Move { pick: usize, time: usize },
    SetStatus { pick: usize, status: ReservationStatus },
    Delete { pick: usize },
}

const TABLES: [&str; 3] = ["T1", "T2", "T3"];
const TIMES: [&str; 3] = ["18:00", "19:00", "20:00"];

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..3usize, 1..3u32, 0..3usize)
            .prop_map(|(table, day, time)| Op::Book { table, day, time }),
        2 => (any::<usize>(), 0..3usize).prop_map(|(pick, time)| Op::Move { pick, time }),
        2 => (any::<usize>(), arb_status()).prop_map(|(pick, status)| Op::SetStatus { pick, status }),
        1 => any::<usize>().prop_map(|pick| Op::Delete { pick }),
    ]
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = store_with_tables().await;
    let engine = Engine::new(
        Arc::new(store.clone()),
        Arc::new(InMemoryCacheStore::new()),
        EngineConfig::default(),
    )
    .unwrap();
    let token = CancellationToken::new();
    let mut ids = Vec::new();

    for op in ops {
        let result = match op {
            Op::Book { table, day, time } => engine
                .bookings
                .create_reservation(
                    Uuid::now_v7(),
                    &request(TABLES[table], &format!("2025-12-0{}", day), TIMES[time], 2),
                    &token,
                )
                .await
                .map(|r| ids.push(r.id)),
            Op::Move { pick, time } if !ids.is_empty() => engine
                .bookings
                .update_reservation(
                    ids[pick % ids.len()],
                    &ReservationUpdate {
                        time: Some(TIMES[time].to_string()),
                        ..Default::default()
                    },
                    &token,
                )
                .await
                .map(|_| ()),
            Op::SetStatus { pick, status } if !ids.is_empty() => engine
                .bookings
                .update_reservation_status(ids[pick % ids.len()], status, &token)
                .await
                .map(|_| ()),
            Op::Delete { pick } if !ids.is_empty() => {
                let id = ids.remove(pick % ids.len());
                engine.bookings.delete_reservation(id, &token).await.map(|_| ())
            }
            _ => Ok(()),
        };
        match result {
            Ok(()) | Err(EngineError::Conflict(_)) | Err(EngineError::Validation(_)) => {}
            Err(other) => return Err(TestCaseError::fail(format!("unexpected: {:?}", other))),
        }

        let all = engine
            .bookings
            .list_reservations(&ReservationFilter::default(), Freshness::BestEffort, &token)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .into_value();
        let mut held = HashSet::new();
        for r in all.iter().filter(|r| r.status.is_active()) {
            prop_assert!(
                held.insert((r.table_number.clone(), r.date, r.time)),
                "slot held twice: {} {} {}",
                r.table_number,
                r.date,
                r.time
            );
        }
        prop_assert_eq!(all.len(), ids.len());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_active_slots_never_double_booked(ops in prop::collection::vec(arb_op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops))?;
    }
}
