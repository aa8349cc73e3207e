use chrono::{Days, Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::models::{AlternativeSlot, Service};
use crate::services::assignment::least_busy_employee;
use crate::services::availability::check_capacity;
use crate::services::slots::generate_slots;

/// Proximity to the requested time dominates; employee load only separates
/// slots that are about equally close.
pub fn priority_score(time_diff: Duration, current_bookings: i64) -> f64 {
    let hours = time_diff.num_minutes().abs() as f64 / 60.0;
    100.0 / (1.0 + hours / 24.0) + 10.0 / (1.0 + current_bookings.max(0) as f64)
}

#[derive(Debug, Clone, Copy)]
pub struct SearchWindow {
    pub requested: NaiveDateTime,
    pub days: u32,
    pub now: NaiveDateTime,
    pub limit: usize,
}

/// Bookable (slot, employee) pairs within `days` calendar days starting at
/// the requested date, best first.
///
/// Candidates are visited date by date, slot by slot, and ordering between
/// equal scores keeps that visiting order, so a fixed database state always
/// gives the same list.
pub fn find_alternatives(
    conn: &Connection,
    service: &Service,
    window: SearchWindow,
) -> anyhow::Result<Vec<AlternativeSlot>> {
    let latest = (service.advance_booking_days > 0)
        .then(|| window.now + Duration::days(service.advance_booking_days));

    let mut candidates = Vec::new();
    let mut slots_checked = 0usize;

    for offset in 0..window.days {
        let Some(date) = window.requested.date().checked_add_days(Days::new(offset.into())) else {
            break;
        };
        if !service.is_open_on(date) {
            continue;
        }

        for slot in generate_slots(service, date) {
            if slot <= window.now || latest.is_some_and(|limit| slot > limit) {
                continue;
            }
            slots_checked += 1;

            if !check_capacity(conn, service, &slot, None, None)?.has_room() {
                continue;
            }
            let Some(employee) = least_busy_employee(conn, service, &slot, None, None)? else {
                continue;
            };

            let time_diff = slot - window.requested;
            candidates.push(AlternativeSlot {
                date_time: slot,
                employee_id: employee.employee_id,
                time_diff_minutes: time_diff.num_minutes().abs(),
                priority: priority_score(time_diff, employee.current_bookings),
            });
        }
    }

    candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    candidates.truncate(window.limit);

    tracing::debug!(
        service_id = %service.id,
        requested = %window.requested,
        slots_checked,
        returned = candidates.len(),
        "alternative slot search finished"
    );

    Ok(candidates)
}
