use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{NaiveDateTime, Weekday};
use rusqlite::TransactionBehavior;

use petcare_scheduler::config::SchedulingConfig;
use petcare_scheduler::db::{self, queries};
use petcare_scheduler::errors::BookingError;
use petcare_scheduler::models::service::parse_time;
use petcare_scheduler::models::{Employee, Service};
use petcare_scheduler::services::clock::FixedClock;
use petcare_scheduler::services::effects::{DeadLetters, EffectQueue, SideEffect};
use petcare_scheduler::services::ids::IdGenerator;
use petcare_scheduler::services::scheduler::{CreateBookingRequest, CreateOutcome, Scheduler};
use tokio::sync::mpsc;

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn seed(path: &str, max_per_slot: i64) {
    let conn = db::init_db(path).unwrap();
    queries::insert_service(
        &conn,
        &Service {
            id: "svc-walk".to_string(),
            company_id: "co-1".to_string(),
            name: "Dog walk".to_string(),
            price: 20.0,
            duration_minutes: 30,
            max_bookings_per_slot: max_per_slot,
            available_days: vec![Weekday::Mon],
            start_time: parse_time("09:00").unwrap(),
            end_time: parse_time("10:00").unwrap(),
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            advance_booking_days: 0,
            assigned_employees: vec!["emp-a".to_string(), "emp-b".to_string()],
            is_active: true,
        },
    )
    .unwrap();
    for id in ["emp-a", "emp-b"] {
        queries::insert_employee(
            &conn,
            &Employee {
                id: id.to_string(),
                company_id: "co-1".to_string(),
                name: id.to_string(),
                work_schedule: None,
                is_active: true,
            },
        )
        .unwrap();
    }
}

fn scheduler(config: SchedulingConfig, seed: u64) -> (Scheduler, mpsc::Receiver<SideEffect>) {
    let (effects, rx) = EffectQueue::new(64, DeadLetters::new(16));
    let scheduler = Scheduler::new(
        config,
        effects,
        Arc::new(FixedClock(dt("2025-06-10 08:00"))),
        IdGenerator::seeded(seed),
    );
    (scheduler, rx)
}

fn walk_at(at: &str) -> CreateBookingRequest {
    CreateBookingRequest {
        service_id: "svc-walk".to_string(),
        pet_id: None,
        employee_id: None,
        date_time: dt(at),
        notes: None,
    }
}

#[test]
fn test_concurrent_requests_for_last_seat() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petcare.db").to_string_lossy().to_string();
    seed(&path, 1);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2u64)
        .map(|n| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut conn = db::init_db_with_timeout(&path, 5000).unwrap();
                let (scheduler, _rx) = scheduler(SchedulingConfig::default(), n);
                let request = CreateBookingRequest {
                    employee_id: Some("emp-a".to_string()),
                    ..walk_at("2025-06-16 09:00")
                };
                barrier.wait();
                scheduler
                    .create_booking(&mut conn, &format!("user-{n}"), &request)
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let booked = outcomes
        .iter()
        .filter(|o| matches!(o, CreateOutcome::Booked(_)))
        .count();
    assert_eq!(booked, 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        CreateOutcome::Unavailable {
            reason: BookingError::SlotFull,
            ..
        }
    )));

    let conn = db::init_db(&path).unwrap();
    let count = queries::count_active_bookings(&conn, "svc-walk", &dt("2025-06-16 09:00"), None, None).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_concurrent_requests_split_across_employees() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petcare.db").to_string_lossy().to_string();
    seed(&path, 2);

    let barrier = Arc::new(Barrier::new(3));
    let handles: Vec<_> = (0..3u64)
        .map(|n| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut conn = db::init_db_with_timeout(&path, 5000).unwrap();
                let (scheduler, _rx) = scheduler(SchedulingConfig::default(), n);
                barrier.wait();
                scheduler
                    .create_booking(&mut conn, &format!("user-{n}"), &walk_at("2025-06-16 09:00"))
                    .unwrap()
            })
        })
        .collect();

    let mut employees: Vec<String> = handles
        .into_iter()
        .filter_map(|h| match h.join().unwrap() {
            CreateOutcome::Booked(created) => Some(created.employee.employee_id),
            CreateOutcome::Unavailable { .. } => None,
        })
        .collect();
    employees.sort();
    assert_eq!(employees, vec!["emp-a", "emp-b"]);
}

#[test]
fn test_held_write_lock_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petcare.db").to_string_lossy().to_string();
    seed(&path, 1);

    let mut conn = db::init_db_with_timeout(&path, 10).unwrap();
    let mut holder = db::init_db(&path).unwrap();
    let tx = holder
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();

    let config = SchedulingConfig {
        conflict_retries: 1,
        conflict_backoff_ms: 1,
        ..SchedulingConfig::default()
    };
    let (scheduler, _rx) = scheduler(config, 1);

    let outcome = scheduler
        .create_booking(&mut conn, "user-1", &walk_at("2025-06-16 09:00"))
        .unwrap();
    match outcome {
        CreateOutcome::Unavailable { reason, alternatives } => {
            assert!(matches!(reason, BookingError::SlotFull));
            // reads still see the free slots while the writer waits
            assert!(!alternatives.is_empty());
        }
        CreateOutcome::Booked(_) => panic!("write lock was held elsewhere"),
    }

    tx.rollback().unwrap();
    let outcome = scheduler
        .create_booking(&mut conn, "user-1", &walk_at("2025-06-16 09:00"))
        .unwrap();
    assert!(matches!(outcome, CreateOutcome::Booked(_)));
}
