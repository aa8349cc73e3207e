use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row of a read-only availability query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub date_time: NaiveDateTime,
    pub available: bool,
    pub current_count: i64,
    pub max_bookings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmployeeAvailability {
    pub employee_id: String,
    pub name: String,
    pub available: bool,
    pub current_bookings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeSlot {
    pub date_time: NaiveDateTime,
    pub employee_id: String,
    /// Distance from the originally requested time, in minutes.
    pub time_diff_minutes: i64,
    pub priority: f64,
}
