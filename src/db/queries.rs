use anyhow::Context;
use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::service::{parse_time, parse_weekday, weekday_key};
use crate::models::{
    Booking, BookingPatch, BookingStatus, Employee, NotificationKind, ScheduledNotification,
    Service,
};

pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_dt(dt: &NaiveDateTime) -> String {
    dt.format(DATE_TIME_FORMAT).to_string()
}

fn parse_dt(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))
}

fn format_time(t: &NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

// ── Services ──

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    service.validate()?;
    let days: Vec<&str> = service.available_days.iter().map(|d| weekday_key(*d)).collect();

    conn.execute(
        "INSERT INTO services (id, company_id, name, price, duration_minutes, max_bookings_per_slot,
                               available_days, start_time, end_time, buffer_before_minutes,
                               buffer_after_minutes, advance_booking_days, assigned_employees, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            service.id,
            service.company_id,
            service.name,
            service.price,
            service.duration_minutes,
            service.max_bookings_per_slot,
            serde_json::to_string(&days)?,
            format_time(&service.start_time),
            format_time(&service.end_time),
            service.buffer_before_minutes,
            service.buffer_after_minutes,
            service.advance_booking_days,
            serde_json::to_string(&service.assigned_employees)?,
            service.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let row = conn
        .query_row(
            "SELECT id, company_id, name, price, duration_minutes, max_bookings_per_slot, available_days,
                    start_time, end_time, buffer_before_minutes, buffer_after_minutes,
                    advance_booking_days, assigned_employees, is_active
             FROM services WHERE id = ?1",
            params![id],
            |row| Ok(parse_service_row(row)),
        )
        .optional()?;

    row.transpose()
}

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let days_json: String = row.get(6)?;
    let start_str: String = row.get(7)?;
    let end_str: String = row.get(8)?;
    let employees_json: String = row.get(12)?;

    let day_names: Vec<String> =
        serde_json::from_str(&days_json).context("invalid available_days column")?;
    let available_days = day_names
        .iter()
        .map(|d| parse_weekday(d).ok_or_else(|| anyhow::anyhow!("invalid weekday: {d}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Service {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        duration_minutes: row.get(4)?,
        max_bookings_per_slot: row.get(5)?,
        available_days,
        start_time: parse_time(&start_str)?,
        end_time: parse_time(&end_str)?,
        buffer_before_minutes: row.get(9)?,
        buffer_after_minutes: row.get(10)?,
        advance_booking_days: row.get(11)?,
        assigned_employees: serde_json::from_str(&employees_json)
            .context("invalid assigned_employees column")?,
        is_active: row.get::<_, i32>(13)? != 0,
    })
}

// ── Employees ──

pub fn insert_employee(conn: &Connection, employee: &Employee) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO employees (id, company_id, name, work_schedule, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            employee.id,
            employee.company_id,
            employee.name,
            employee.work_schedule,
            employee.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_employee(conn: &Connection, id: &str) -> anyhow::Result<Option<Employee>> {
    let employee = conn
        .query_row(
            "SELECT id, company_id, name, work_schedule, is_active FROM employees WHERE id = ?1",
            params![id],
            |row| {
                Ok(Employee {
                    id: row.get(0)?,
                    company_id: row.get(1)?,
                    name: row.get(2)?,
                    work_schedule: row.get(3)?,
                    is_active: row.get::<_, i32>(4)? != 0,
                })
            },
        )
        .optional()?;
    Ok(employee)
}

// ── Pets ──

pub fn insert_pet(conn: &Connection, id: &str, owner_id: &str, name: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO pets (id, owner_id, name) VALUES (?1, ?2, ?3)",
        params![id, owner_id, name],
    )?;
    Ok(())
}

pub fn get_pet_owner(conn: &Connection, pet_id: &str) -> anyhow::Result<Option<String>> {
    let owner = conn
        .query_row(
            "SELECT owner_id FROM pets WHERE id = ?1",
            params![pet_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

pub fn validate_pet_ownership(conn: &Connection, pet_id: &str, user_id: &str) -> anyhow::Result<bool> {
    Ok(get_pet_owner(conn, pet_id)?.as_deref() == Some(user_id))
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, company_id, service_id, pet_id, employee_id, date_time, \
     duration_minutes, price, status, notes, payment_id, created_at, updated_at";

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, user_id, company_id, service_id, pet_id, employee_id, date_time,
                               duration_minutes, price, status, notes, payment_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            booking.id,
            booking.user_id,
            booking.company_id,
            booking.service_id,
            booking.pet_id,
            booking.employee_id,
            format_dt(&booking.date_time),
            booking.duration_minutes,
            booking.price,
            booking.status.as_str(),
            booking.notes,
            booking.payment_id,
            format_dt(&booking.created_at),
            format_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    booking.transpose()
}

/// SQL list of the statuses that no longer hold a slot, e.g. `'cancelled', 'rejected'`.
fn inactive_statuses() -> String {
    BookingStatus::ALL
        .iter()
        .filter(|s| !s.is_active())
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Active bookings for a service at exactly `date_time`, optionally narrowed
/// to one employee. `exclude` skips a booking that is being moved.
pub fn count_active_bookings(
    conn: &Connection,
    service_id: &str,
    date_time: &NaiveDateTime,
    employee_id: Option<&str>,
    exclude: Option<&str>,
) -> anyhow::Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM bookings
         WHERE service_id = ?1 AND date_time = ?2
           AND (?3 IS NULL OR employee_id = ?3)
           AND (?4 IS NULL OR id != ?4)
           AND status NOT IN ({})",
        inactive_statuses()
    );
    let count = conn.query_row(
        &sql,
        params![service_id, format_dt(date_time), employee_id, exclude],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Active bookings held by an employee at `date_time`, across all services.
pub fn count_employee_bookings(
    conn: &Connection,
    employee_id: &str,
    date_time: &NaiveDateTime,
    exclude: Option<&str>,
) -> anyhow::Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM bookings
         WHERE employee_id = ?1 AND date_time = ?2
           AND (?3 IS NULL OR id != ?3)
           AND status NOT IN ({})",
        inactive_statuses()
    );
    let count = conn.query_row(
        &sql,
        params![employee_id, format_dt(date_time), exclude],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Writes only the fields present in `patch`. Returns false if no row matched.
pub fn apply_booking_patch(
    conn: &Connection,
    id: &str,
    patch: &BookingPatch,
    updated_at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let mut sets: Vec<&str> = vec![];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(date_time) = &patch.date_time {
        sets.push("date_time = ?");
        values.push(Box::new(format_dt(date_time)));
    }
    if let Some(notes) = &patch.notes {
        sets.push("notes = ?");
        values.push(Box::new(notes.clone()));
    }
    if let Some(employee_id) = &patch.employee_id {
        sets.push("employee_id = ?");
        values.push(Box::new(employee_id.clone()));
    }
    if let Some(status) = &patch.status {
        sets.push("status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(duration) = patch.duration_minutes {
        sets.push("duration_minutes = ?");
        values.push(Box::new(duration));
    }

    sets.push("updated_at = ?");
    values.push(Box::new(format_dt(updated_at)));
    values.push(Box::new(id.to_string()));

    let sql = format!("UPDATE bookings SET {} WHERE id = ?", sets.join(", "));
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let count = conn.execute(&sql, params_refs.as_slice())?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_time_str: String = row.get(6)?;
    let status_str: String = row.get(9)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;

    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        company_id: row.get(2)?,
        service_id: row.get(3)?,
        pet_id: row.get(4)?,
        employee_id: row.get(5)?,
        date_time: parse_dt(&date_time_str)?,
        duration_minutes: row.get(7)?,
        price: row.get(8)?,
        status,
        notes: row.get(10)?,
        payment_id: row.get(11)?,
        created_at: parse_dt(&created_at_str)?,
        updated_at: parse_dt(&updated_at_str)?,
    })
}

// ── Scheduled Notifications ──

pub fn insert_scheduled_notification(
    conn: &Connection,
    notification: &ScheduledNotification,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO scheduled_notifications (user_id, booking_id, kind, scheduled_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            notification.user_id,
            notification.booking_id,
            notification.kind.as_str(),
            format_dt(&notification.scheduled_at),
            serde_json::to_string(&notification.payload)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Removes notifications for a booking that have not gone out yet.
pub fn cancel_scheduled_notifications(conn: &Connection, booking_id: &str) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM scheduled_notifications WHERE booking_id = ?1 AND sent = 0",
        params![booking_id],
    )?;
    Ok(count)
}

pub fn get_pending_notifications(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<ScheduledNotification>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, booking_id, kind, scheduled_at, payload
         FROM scheduled_notifications WHERE booking_id = ?1 AND sent = 0
         ORDER BY scheduled_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        let user_id: String = row.get(0)?;
        let booking_id: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let scheduled_at: String = row.get(3)?;
        let payload: String = row.get(4)?;
        Ok((user_id, booking_id, kind, scheduled_at, payload))
    })?;

    let mut notifications = vec![];
    for row in rows {
        let (user_id, booking_id, kind, scheduled_at, payload) = row?;
        let kind = match kind.as_str() {
            "booking_reminder_24h" => NotificationKind::BookingReminder24h,
            "booking_reminder_2h" => NotificationKind::BookingReminder2h,
            "booking_follow_up" => NotificationKind::BookingFollowUp,
            other => anyhow::bail!("unknown notification kind: {other}"),
        };
        notifications.push(ScheduledNotification {
            user_id,
            booking_id,
            kind,
            scheduled_at: parse_dt(&scheduled_at)?,
            payload: serde_json::from_str(&payload)?,
        });
    }
    Ok(notifications)
}
