use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub company_id: String,
    pub service_id: String,
    pub pet_id: Option<String>,
    pub employee_id: Option<String>,
    pub date_time: NaiveDateTime,
    /// Copied from the service when the booking is created.
    pub duration_minutes: i64,
    pub price: f64,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn end_time(&self) -> NaiveDateTime {
        self.date_time + chrono::Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    Rescheduled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
        BookingStatus::Rescheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "in_progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "rejected" => Some(BookingStatus::Rejected),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            _ => None,
        }
    }

    pub fn allowed_transitions(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled, Rejected],
            Confirmed => &[InProgress, Cancelled, Rescheduled],
            InProgress => &[Completed, Cancelled],
            Rescheduled => &[Confirmed, Cancelled],
            Completed | Cancelled | Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Active bookings count toward slot capacity.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::Rejected)
    }
}

/// Fields a booking update may touch. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingPatch {
    pub date_time: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub employee_id: Option<String>,
    pub status: Option<BookingStatus>,
    pub duration_minutes: Option<i64>,
}
