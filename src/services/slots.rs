use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::Service;

/// The slot grid of a service: where the working window starts and ends and
/// how far apart consecutive start times sit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotGrid {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
}

impl SlotGrid {
    pub fn for_service(service: &Service) -> Self {
        Self {
            start_time: service.start_time,
            end_time: service.end_time,
            duration_minutes: service.duration_minutes,
            buffer_before_minutes: service.buffer_before_minutes,
            buffer_after_minutes: service.buffer_after_minutes,
        }
    }

    pub fn step(&self) -> Duration {
        Duration::minutes(
            self.duration_minutes + self.buffer_before_minutes + self.buffer_after_minutes,
        )
    }

    /// Start times on `date`. Calling this again, or cloning the iterator
    /// before use, yields the same sequence.
    pub fn slots_on(&self, date: NaiveDate) -> Slots {
        Slots {
            next: Some(date.and_time(self.start_time)),
            close: date.and_time(self.end_time),
            tail: Duration::minutes(self.duration_minutes + self.buffer_after_minutes),
            step: self.step(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Slots {
    next: Option<NaiveDateTime>,
    close: NaiveDateTime,
    tail: Duration,
    step: Duration,
}

impl Iterator for Slots {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<NaiveDateTime> {
        let slot = self.next?;
        if slot + self.tail > self.close || self.step <= Duration::zero() {
            self.next = None;
            return None;
        }
        self.next = Some(slot + self.step);
        Some(slot)
    }
}

/// Candidate start times for `service` on `date`; empty on closed weekdays.
pub fn generate_slots(service: &Service, date: NaiveDate) -> Slots {
    let grid = SlotGrid::for_service(service);
    let mut slots = grid.slots_on(date);
    if !service.is_open_on(date) {
        slots.next = None;
    }
    slots
}
