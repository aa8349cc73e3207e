use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::SchedulingConfig;
use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{
    AlternativeSlot, AvailabilitySlot, Booking, BookingPatch, BookingStatus, EmployeeAvailability,
    Service,
};
use crate::services::alternatives::{self, SearchWindow};
use crate::services::assignment::{least_busy_employee, select_employee};
use crate::services::availability::{check_capacity, resolve_employee};
use crate::services::clock::Clock;
use crate::services::effects::{EffectQueue, SideEffect};
use crate::services::ids::IdGenerator;
use crate::services::notifications::{follow_up_for, reminders_for};
use crate::services::slots::generate_slots;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: String,
    pub pet_id: Option<String>,
    pub employee_id: Option<String>,
    pub date_time: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub employee: EmployeeAvailability,
}

#[derive(Debug)]
pub enum CreateOutcome {
    Booked(CreatedBooking),
    /// The slot could not be taken; `alternatives` may be empty.
    Unavailable {
        reason: BookingError,
        alternatives: Vec<AlternativeSlot>,
    },
}

/// Entry point for every booking operation. Writes run inside an immediate
/// SQLite transaction, which holds the database write lock from the capacity
/// read through the insert or update.
pub struct Scheduler {
    config: SchedulingConfig,
    effects: EffectQueue,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
}

impl Scheduler {
    pub fn new(
        config: SchedulingConfig,
        effects: EffectQueue,
        clock: Arc<dyn Clock>,
        ids: IdGenerator,
    ) -> Self {
        Self {
            config,
            effects,
            clock,
            ids,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn create_booking(
        &self,
        conn: &mut Connection,
        user_id: &str,
        request: &CreateBookingRequest,
    ) -> Result<CreateOutcome, BookingError> {
        let now = self.now();
        let service = load_active_service(conn, &request.service_id)?;
        validate_time(&service, &request.date_time, now)?;

        if let Some(pet_id) = request.pet_id.as_deref() {
            if queries::get_pet_owner(conn, pet_id)?.is_none() {
                return Err(BookingError::InvalidInput(format!("pet not found: {pet_id}")));
            }
            if !queries::validate_pet_ownership(conn, pet_id, user_id)? {
                return Err(BookingError::PetOwnershipMismatch);
            }
        }

        let result = self.in_write_transaction(conn, || BookingError::SlotFull, |tx| {
            self.insert_booking(tx, &service, user_id, request, now)
        });

        match result {
            Ok(created) => {
                tracing::info!(
                    booking_id = %created.booking.id,
                    service_id = %service.id,
                    employee_id = %created.employee.employee_id,
                    date_time = %created.booking.date_time,
                    "booking created"
                );
                for reminder in reminders_for(&created.booking, now) {
                    self.effects.submit(SideEffect::ScheduleNotification(reminder));
                }
                Ok(CreateOutcome::Booked(created))
            }
            Err(reason) if reason.is_capacity() => {
                tracing::info!(
                    service_id = %service.id,
                    date_time = %request.date_time,
                    reason = reason.reason_code(),
                    "requested slot unavailable, searching alternatives"
                );
                let alternatives = self.search(conn, &service, request.date_time, None)?;
                Ok(CreateOutcome::Unavailable {
                    reason,
                    alternatives,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn insert_booking(
        &self,
        tx: &Transaction<'_>,
        service: &Service,
        user_id: &str,
        request: &CreateBookingRequest,
        now: NaiveDateTime,
    ) -> Result<CreatedBooking, BookingError> {
        if !check_capacity(tx, service, &request.date_time, None, None)?.has_room() {
            return Err(BookingError::SlotFull);
        }
        let employee = select_employee(
            tx,
            service,
            &request.date_time,
            request.employee_id.as_deref(),
            None,
        )?;

        let booking = Booking {
            id: self.ids.next_id(),
            user_id: user_id.to_string(),
            company_id: service.company_id.clone(),
            service_id: service.id.clone(),
            pet_id: request.pet_id.clone(),
            employee_id: Some(employee.employee_id.clone()),
            date_time: request.date_time,
            duration_minutes: service.duration_minutes,
            price: service.price,
            status: BookingStatus::Pending,
            notes: request.notes.clone(),
            payment_id: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(tx, &booking)?;

        Ok(CreatedBooking { booking, employee })
    }

    /// Read-only view of every slot of the service on `date`.
    pub fn check_availability(
        &self,
        conn: &Connection,
        service_id: &str,
        date: NaiveDate,
        employee_id: Option<&str>,
    ) -> Result<Vec<AvailabilitySlot>, BookingError> {
        let now = self.now();
        let service = load_active_service(conn, service_id)?;
        if let Some(employee_id) = employee_id {
            if !service.assigned_employees.iter().any(|e| e == employee_id) {
                return Err(BookingError::InvalidInput(format!(
                    "employee {employee_id} is not assigned to service {service_id}"
                )));
            }
        }

        let mut slots = Vec::new();
        for slot in generate_slots(&service, date) {
            let capacity = check_capacity(conn, &service, &slot, employee_id, None)?;
            let bookable_time = validate_time(&service, &slot, now).is_ok();

            let available = bookable_time
                && capacity.has_room()
                && match employee_id {
                    Some(employee_id) => {
                        check_capacity(conn, &service, &slot, None, None)?.has_room()
                            && resolve_employee(conn, &service, employee_id, &slot, None)?
                                .is_some_and(|e| e.available)
                    }
                    None => least_busy_employee(conn, &service, &slot, None, None)?.is_some(),
                };

            slots.push(AvailabilitySlot {
                date_time: slot,
                available,
                current_count: capacity.current,
                max_bookings: capacity.max,
            });
        }
        Ok(slots)
    }

    pub fn find_alternatives(
        &self,
        conn: &Connection,
        service_id: &str,
        requested: NaiveDateTime,
        days: Option<u32>,
    ) -> Result<Vec<AlternativeSlot>, BookingError> {
        let service = load_active_service(conn, service_id)?;
        self.search(conn, &service, requested, days)
    }

    fn search(
        &self,
        conn: &Connection,
        service: &Service,
        requested: NaiveDateTime,
        days: Option<u32>,
    ) -> Result<Vec<AlternativeSlot>, BookingError> {
        let window = SearchWindow {
            requested,
            days: days
                .unwrap_or(self.config.search_days)
                .min(self.config.max_search_days),
            now: self.now(),
            limit: self.config.max_alternatives,
        };
        Ok(alternatives::find_alternatives(conn, service, window)?)
    }

    pub fn get_booking(&self, conn: &Connection, booking_id: &str) -> Result<Booking, BookingError> {
        queries::get_booking_by_id(conn, booking_id)?
            .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))
    }

    pub fn update_booking_status(
        &self,
        conn: &mut Connection,
        booking_id: &str,
        new_status: BookingStatus,
        notes: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let now = self.now();
        let (previous, booking) = self.in_write_transaction(conn, database_busy, |tx| {
            let current = queries::get_booking_by_id(tx, booking_id)?
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;
            if !current.status.can_transition_to(new_status) {
                return Err(BookingError::InvalidStateTransition {
                    from: current.status,
                    to: new_status,
                });
            }

            let patch = BookingPatch {
                status: Some(new_status),
                notes: notes.filter(|n| !n.trim().is_empty()).map(str::to_string),
                ..Default::default()
            };
            queries::apply_booking_patch(tx, booking_id, &patch, &now)?;
            let updated = queries::get_booking_by_id(tx, booking_id)?
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;
            Ok((current.status, updated))
        })?;

        tracing::info!(
            booking_id,
            from = previous.as_str(),
            to = new_status.as_str(),
            "booking status changed"
        );
        for effect in status_effects(&booking, now) {
            self.effects.submit(effect);
        }
        Ok(booking)
    }

    pub fn reschedule_booking(
        &self,
        conn: &mut Connection,
        booking_id: &str,
        new_date_time: NaiveDateTime,
        reason: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let now = self.now();
        let booking = self.in_write_transaction(conn, || BookingError::SlotFull, |tx| {
            let current = queries::get_booking_by_id(tx, booking_id)?
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;
            if !matches!(
                current.status,
                BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Rescheduled
            ) {
                return Err(BookingError::InvalidStateTransition {
                    from: current.status,
                    to: BookingStatus::Rescheduled,
                });
            }

            let service = load_active_service(tx, &current.service_id)?;
            validate_time(&service, &new_date_time, now)?;

            if !check_capacity(tx, &service, &new_date_time, None, Some(booking_id))?.has_room() {
                return Err(BookingError::SlotFull);
            }
            let employee_id = match current.employee_id.as_deref() {
                Some(employee_id) => {
                    keep_employee(tx, &service, employee_id, &new_date_time, booking_id)?;
                    None
                }
                None => {
                    let chosen = select_employee(tx, &service, &new_date_time, None, Some(booking_id))
                        .map_err(|e| if e.is_capacity() { BookingError::SlotFull } else { e })?;
                    Some(chosen.employee_id)
                }
            };

            let status = (current.status == BookingStatus::Confirmed)
                .then_some(BookingStatus::Rescheduled);
            let patch = BookingPatch {
                date_time: Some(new_date_time),
                notes: reason
                    .filter(|r| !r.trim().is_empty())
                    .map(|r| append_note(current.notes.as_deref(), &format!("Rescheduled: {}", r.trim()))),
                employee_id,
                status,
                duration_minutes: None,
            };
            queries::apply_booking_patch(tx, booking_id, &patch, &now)?;
            queries::get_booking_by_id(tx, booking_id)?
                .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))
        })?;

        tracing::info!(
            booking_id,
            date_time = %booking.date_time,
            status = booking.status.as_str(),
            "booking rescheduled"
        );
        self.effects.submit(SideEffect::CancelScheduled {
            booking_id: booking.id.clone(),
        });
        for reminder in reminders_for(&booking, now) {
            self.effects.submit(SideEffect::ScheduleNotification(reminder));
        }
        Ok(booking)
    }

    /// Runs `op` in a `BEGIN IMMEDIATE` transaction. Losing the race for the
    /// write lock (SQLITE_BUSY) retries the whole operation with backoff;
    /// after `conflict_retries` retries the error from `exhausted` is returned.
    /// The backoff sleeps the calling thread, so async callers run this
    /// through `spawn_blocking`.
    fn in_write_transaction<T>(
        &self,
        conn: &mut Connection,
        exhausted: fn() -> BookingError,
        mut op: impl FnMut(&Transaction<'_>) -> Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        let mut retries = 0;
        loop {
            let result = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(BookingError::from)
                .and_then(|tx| {
                    let value = op(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });

            match result {
                Err(e) if is_conflict(&e) => {
                    if retries >= self.config.conflict_retries {
                        tracing::warn!(retries, error = %e, "write conflict persisted, giving up");
                        return Err(exhausted());
                    }
                    retries += 1;
                    tracing::warn!(retry = retries, error = %e, "write conflict, retrying");
                    std::thread::sleep(StdDuration::from_millis(
                        self.config.conflict_backoff_ms * u64::from(retries),
                    ));
                }
                other => return other,
            }
        }
    }
}

/// Side effects owed after a booking enters its current status.
pub fn status_effects(booking: &Booking, now: NaiveDateTime) -> Vec<SideEffect> {
    let cancel = || SideEffect::CancelScheduled {
        booking_id: booking.id.clone(),
    };
    match booking.status {
        BookingStatus::Confirmed => std::iter::once(cancel())
            .chain(reminders_for(booking, now).into_iter().map(SideEffect::ScheduleNotification))
            .collect(),
        BookingStatus::Cancelled | BookingStatus::Rejected => vec![cancel()],
        BookingStatus::Completed => vec![
            SideEffect::ScheduleNotification(follow_up_for(booking)),
            SideEffect::MarkServiceCompleted {
                booking_id: booking.id.clone(),
            },
        ],
        BookingStatus::Pending | BookingStatus::InProgress | BookingStatus::Rescheduled => vec![],
    }
}

fn load_active_service(conn: &Connection, service_id: &str) -> Result<Service, BookingError> {
    let service = queries::get_service(conn, service_id)?
        .ok_or_else(|| BookingError::ServiceNotFound(service_id.to_string()))?;
    if !service.is_active {
        return Err(BookingError::ServiceInactive(service_id.to_string()));
    }
    Ok(service)
}

fn validate_time(service: &Service, date_time: &NaiveDateTime, now: NaiveDateTime) -> Result<(), BookingError> {
    if *date_time <= now {
        return Err(BookingError::PastOrOutOfWindowDate(
            "booking time must be in the future".to_string(),
        ));
    }
    if service.advance_booking_days > 0
        && *date_time > now + Duration::days(service.advance_booking_days)
    {
        return Err(BookingError::PastOrOutOfWindowDate(format!(
            "bookings open at most {} days ahead",
            service.advance_booking_days
        )));
    }
    if !service.within_hours(date_time) {
        return Err(BookingError::OutsideServiceHours);
    }
    // capacity is counted per exact start instant, so only grid starts are bookable
    if !generate_slots(service, date_time.date()).any(|slot| slot == *date_time) {
        return Err(BookingError::InvalidInput(format!(
            "{date_time} is not a slot start time for service {}",
            service.id
        )));
    }
    Ok(())
}

/// A rescheduled booking keeps its employee, so that employee has to be free
/// at the new time.
fn keep_employee(
    tx: &Transaction<'_>,
    service: &Service,
    employee_id: &str,
    date_time: &NaiveDateTime,
    booking_id: &str,
) -> Result<(), BookingError> {
    let free = resolve_employee(tx, service, employee_id, date_time, Some(booking_id))?
        .is_some_and(|e| e.available)
        && check_capacity(tx, service, date_time, Some(employee_id), Some(booking_id))?.has_room();
    if free {
        Ok(())
    } else {
        Err(BookingError::SlotFull)
    }
}

fn append_note(existing: Option<&str>, line: &str) -> String {
    match existing.filter(|n| !n.is_empty()) {
        Some(existing) => format!("{existing}\n{line}"),
        None => line.to_string(),
    }
}

fn database_busy() -> BookingError {
    BookingError::Persistence(anyhow::anyhow!("database busy"))
}

fn is_conflict(e: &BookingError) -> bool {
    let BookingError::Persistence(err) = e else {
        return false;
    };
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
