use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingReminder24h,
    BookingReminder2h,
    BookingFollowUp,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingReminder24h => "booking_reminder_24h",
            NotificationKind::BookingReminder2h => "booking_reminder_2h",
            NotificationKind::BookingFollowUp => "booking_follow_up",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledNotification {
    pub user_id: String,
    pub booking_id: String,
    pub kind: NotificationKind,
    pub scheduled_at: NaiveDateTime,
    pub payload: serde_json::Value,
}
