use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub max_bookings_per_slot: i64,
    pub available_days: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    /// Zero disables the upper booking window.
    pub advance_booking_days: i64,
    /// Employees eligible for this service, in preference order.
    pub assigned_employees: Vec<String>,
    pub is_active: bool,
}

impl Service {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.duration_minutes <= 0 {
            anyhow::bail!("service duration must be positive");
        }
        if self.start_time >= self.end_time {
            anyhow::bail!("service start time must be before end time");
        }
        if self.max_bookings_per_slot < 1 {
            anyhow::bail!("max bookings per slot must be at least 1");
        }
        if self.buffer_before_minutes < 0 || self.buffer_after_minutes < 0 {
            anyhow::bail!("buffers cannot be negative");
        }
        Ok(())
    }

    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        self.available_days.contains(&date.weekday())
    }

    /// Whether a booking starting at `dt` fits inside the service's working
    /// window, including the trailing buffer.
    pub fn within_hours(&self, dt: &NaiveDateTime) -> bool {
        if !self.is_open_on(dt.date()) {
            return false;
        }
        let open = dt.date().and_time(self.start_time);
        let close = dt.date().and_time(self.end_time);
        let finish = *dt
            + chrono::Duration::minutes(self.duration_minutes + self.buffer_after_minutes);
        *dt >= open && finish <= close
    }
}

pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Accepts both short ("mon") and long ("monday") names, any case.
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .map_err(|_| anyhow::anyhow!("invalid time format: {s}"))
}
