use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::errors::BookingError;
use crate::models::{EmployeeAvailability, Service};
use crate::services::availability::{check_capacity, resolve_employee};

/// The available assigned employee with the fewest bookings at `date_time`.
/// Ties go to whoever comes first in the service's employee list.
pub fn least_busy_employee(
    conn: &Connection,
    service: &Service,
    date_time: &NaiveDateTime,
    skip: Option<&str>,
    exclude: Option<&str>,
) -> anyhow::Result<Option<EmployeeAvailability>> {
    let mut best: Option<EmployeeAvailability> = None;

    for employee_id in &service.assigned_employees {
        if Some(employee_id.as_str()) == skip {
            continue;
        }
        let Some(candidate) = bookable(conn, service, employee_id, date_time, exclude)? else {
            continue;
        };
        let better = best
            .as_ref()
            .map_or(true, |b| candidate.current_bookings < b.current_bookings);
        if better {
            best = Some(candidate);
        }
    }

    Ok(best)
}

/// Picks the employee for a booking at `date_time`. A requested employee is
/// honoured when free; otherwise the least busy of the remaining assigned
/// employees takes the booking.
pub fn select_employee(
    conn: &Connection,
    service: &Service,
    date_time: &NaiveDateTime,
    requested: Option<&str>,
    exclude: Option<&str>,
) -> Result<EmployeeAvailability, BookingError> {
    if let Some(requested) = requested {
        if !service.assigned_employees.iter().any(|e| e == requested) {
            return Err(BookingError::InvalidInput(format!(
                "employee {requested} is not assigned to service {}",
                service.id
            )));
        }
        if let Some(employee) = bookable(conn, service, requested, date_time, exclude)? {
            return Ok(employee);
        }
        tracing::info!(
            employee_id = requested,
            service_id = %service.id,
            %date_time,
            "requested employee unavailable, trying other assigned employees"
        );
    }

    least_busy_employee(conn, service, date_time, requested, exclude)?
        .ok_or(BookingError::NoEmployeeAvailable)
}

/// Resolved availability, kept only if the employee is on schedule, below the
/// per-slot limit and not already booked for this service at that instant.
fn bookable(
    conn: &Connection,
    service: &Service,
    employee_id: &str,
    date_time: &NaiveDateTime,
    exclude: Option<&str>,
) -> anyhow::Result<Option<EmployeeAvailability>> {
    let Some(resolved) = resolve_employee(conn, service, employee_id, date_time, exclude)? else {
        return Ok(None);
    };
    if !resolved.available {
        return Ok(None);
    }
    let own_slot = check_capacity(conn, service, date_time, Some(employee_id), exclude)?;
    Ok(own_slot.has_room().then_some(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, queries};
    use crate::models::service::parse_time;
    use crate::models::{Booking, BookingStatus, Employee};
    use chrono::Weekday;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup(max: i64, employees: &[&str]) -> (Connection, Service) {
        let conn = db::init_db(":memory:").unwrap();
        let svc = Service {
            id: "svc-sit".to_string(),
            company_id: "co-1".to_string(),
            name: "Pet sitting".to_string(),
            price: 35.0,
            duration_minutes: 60,
            max_bookings_per_slot: max,
            available_days: vec![Weekday::Mon],
            start_time: parse_time("08:00").unwrap(),
            end_time: parse_time("18:00").unwrap(),
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            advance_booking_days: 0,
            assigned_employees: employees.iter().map(|e| e.to_string()).collect(),
            is_active: true,
        };
        queries::insert_service(&conn, &svc).unwrap();
        for id in employees {
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
        (conn, svc)
    }

    fn book(conn: &Connection, id: &str, service_id: &str, employee: &str, at: &str) {
        let now = dt("2025-06-01 08:00");
        queries::create_booking(
            conn,
            &Booking {
                id: id.to_string(),
                user_id: "user-1".to_string(),
                company_id: "co-1".to_string(),
                service_id: service_id.to_string(),
                pet_id: None,
                employee_id: Some(employee.to_string()),
                date_time: dt(at),
                duration_minutes: 60,
                price: 35.0,
                status: BookingStatus::Confirmed,
                notes: None,
                payment_id: None,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    fn other_service(conn: &Connection) {
        let mut svc = queries::get_service(conn, "svc-sit").unwrap().unwrap();
        svc.id = "svc-other".to_string();
        queries::insert_service(conn, &svc).unwrap();
    }

    #[test]
    fn test_first_listed_wins_ties() {
        let (conn, svc) = setup(2, &["emp-a", "emp-b", "emp-c"]);
        let chosen = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), None, None).unwrap();
        assert_eq!(chosen.employee_id, "emp-a");
    }

    #[test]
    fn test_lowest_load_wins() {
        let (conn, svc) = setup(3, &["emp-a", "emp-b", "emp-c"]);
        other_service(&conn);
        // emp-a and emp-b are busy on another service at the same instant
        book(&conn, "b1", "svc-other", "emp-a", "2025-06-16 10:00");
        book(&conn, "b2", "svc-other", "emp-b", "2025-06-16 10:00");
        book(&conn, "b3", "svc-other", "emp-b", "2025-06-16 10:00");

        let chosen = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), None, None).unwrap();
        assert_eq!(chosen.employee_id, "emp-c");
        assert_eq!(chosen.current_bookings, 0);
    }

    #[test]
    fn test_employee_already_on_this_slot_is_skipped() {
        let (conn, svc) = setup(3, &["emp-a", "emp-b"]);
        book(&conn, "b1", "svc-sit", "emp-a", "2025-06-16 10:00");
        let chosen = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), None, None).unwrap();
        assert_eq!(chosen.employee_id, "emp-b");
    }

    #[test]
    fn test_requested_employee_honoured() {
        let (conn, svc) = setup(1, &["emp-a", "emp-b"]);
        let chosen =
            select_employee(&conn, &svc, &dt("2025-06-16 10:00"), Some("emp-b"), None).unwrap();
        assert_eq!(chosen.employee_id, "emp-b");
    }

    #[test]
    fn test_busy_requested_employee_falls_back() {
        let (conn, svc) = setup(1, &["emp-a", "emp-b"]);
        book(&conn, "b1", "svc-sit", "emp-a", "2025-06-16 10:00");
        let chosen =
            select_employee(&conn, &svc, &dt("2025-06-16 10:00"), Some("emp-a"), None).unwrap();
        assert_eq!(chosen.employee_id, "emp-b");
    }

    #[test]
    fn test_unassigned_employee_rejected() {
        let (conn, svc) = setup(1, &["emp-a"]);
        let err = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), Some("emp-z"), None)
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[test]
    fn test_nobody_free() {
        let (conn, svc) = setup(1, &["emp-a", "emp-b"]);
        book(&conn, "b1", "svc-sit", "emp-a", "2025-06-16 10:00");
        book(&conn, "b2", "svc-sit", "emp-b", "2025-06-16 10:00");
        let err = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), None, None).unwrap_err();
        assert!(matches!(err, BookingError::NoEmployeeAvailable));
    }

    #[test]
    fn test_no_assigned_employees() {
        let (conn, svc) = setup(1, &[]);
        let err = select_employee(&conn, &svc, &dt("2025-06-16 10:00"), None, None).unwrap_err();
        assert!(matches!(err, BookingError::NoEmployeeAvailable));
    }
}
