use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{EmployeeAvailability, ScheduleDecision, Service, WorkSchedule};

/// Occupancy of one slot against its applicable capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCapacity {
    pub current: i64,
    pub max: i64,
}

impl SlotCapacity {
    pub fn has_room(&self) -> bool {
        self.current < self.max
    }
}

/// Counts active bookings for the service at exactly `date_time`. With an
/// employee the capacity is one, since nobody can serve two bookings that
/// start at the same instant; otherwise it is the service's per-slot limit.
///
/// Callers that go on to insert must run this inside the same write
/// transaction as the insert.
pub fn check_capacity(
    conn: &Connection,
    service: &Service,
    date_time: &NaiveDateTime,
    employee_id: Option<&str>,
    exclude: Option<&str>,
) -> anyhow::Result<SlotCapacity> {
    let current = queries::count_active_bookings(conn, &service.id, date_time, employee_id, exclude)?;
    let max = match employee_id {
        Some(_) => 1,
        None => service.max_bookings_per_slot,
    };
    Ok(SlotCapacity { current, max })
}

/// Whether `employee_id` can take a booking of `service` at `date_time`.
/// Returns `None` when the employee record does not exist.
///
/// An employee whose schedule is missing, unparseable, or silent about the
/// weekday is treated as working. Each such fallback is logged.
pub fn resolve_employee(
    conn: &Connection,
    service: &Service,
    employee_id: &str,
    date_time: &NaiveDateTime,
    exclude: Option<&str>,
) -> anyhow::Result<Option<EmployeeAvailability>> {
    let Some(employee) = queries::get_employee(conn, employee_id)? else {
        tracing::warn!(employee_id, service_id = %service.id, "assigned employee not found");
        return Ok(None);
    };

    let on_schedule = employee.is_active
        && works_at(
            &employee.id,
            employee.work_schedule.as_deref(),
            date_time,
            service.duration_minutes,
        );

    let current_bookings = queries::count_employee_bookings(conn, &employee.id, date_time, exclude)?;

    Ok(Some(EmployeeAvailability {
        employee_id: employee.id,
        name: employee.name,
        available: on_schedule && current_bookings < service.max_bookings_per_slot,
        current_bookings,
    }))
}

fn works_at(
    employee_id: &str,
    raw_schedule: Option<&str>,
    date_time: &NaiveDateTime,
    duration_minutes: i64,
) -> bool {
    let raw = match raw_schedule.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            tracing::warn!(employee_id, "no work schedule, assuming available");
            return true;
        }
    };

    let schedule = match WorkSchedule::from_json(raw) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::warn!(employee_id, error = %e, "unparseable work schedule, assuming available");
            return true;
        }
    };

    match schedule.decide(date_time, duration_minutes) {
        ScheduleDecision::Working => true,
        ScheduleDecision::DayOff | ScheduleDecision::OutsideHours => false,
        ScheduleDecision::NoEntry(reason) => {
            tracing::warn!(employee_id, %reason, "work schedule fallback, assuming available");
            true
        }
    }
}
