use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Booking, NotificationKind, ScheduledNotification};

/// Where scheduled notifications are recorded for later delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn schedule(&self, notification: &ScheduledNotification) -> anyhow::Result<()>;
    async fn cancel_for_booking(&self, booking_id: &str) -> anyhow::Result<()>;
}

/// Stores notifications in the `scheduled_notifications` table, which the
/// delivery service polls.
pub struct SqliteNotificationSink {
    db: Arc<Mutex<Connection>>,
}

impl SqliteNotificationSink {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn schedule(&self, notification: &ScheduledNotification) -> anyhow::Result<()> {
        let db = self.db.lock().map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        queries::insert_scheduled_notification(&db, notification)?;
        Ok(())
    }

    async fn cancel_for_booking(&self, booking_id: &str) -> anyhow::Result<()> {
        let db = self.db.lock().map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        let removed = queries::cancel_scheduled_notifications(&db, booking_id)?;
        tracing::debug!(booking_id, removed, "cancelled scheduled notifications");
        Ok(())
    }
}

fn payload(booking: &Booking) -> serde_json::Value {
    serde_json::json!({
        "booking_id": booking.id,
        "service_id": booking.service_id,
        "pet_id": booking.pet_id,
        "employee_id": booking.employee_id,
        "date_time": queries::format_dt(&booking.date_time),
    })
}

fn notification(booking: &Booking, kind: NotificationKind, at: NaiveDateTime) -> ScheduledNotification {
    ScheduledNotification {
        user_id: booking.user_id.clone(),
        booking_id: booking.id.clone(),
        kind,
        scheduled_at: at,
        payload: payload(booking),
    }
}

/// The 24h and 2h reminders, minus any whose time has already passed.
pub fn reminders_for(booking: &Booking, now: NaiveDateTime) -> Vec<ScheduledNotification> {
    [
        (NotificationKind::BookingReminder24h, Duration::hours(24)),
        (NotificationKind::BookingReminder2h, Duration::hours(2)),
    ]
    .into_iter()
    .map(|(kind, lead)| (kind, booking.date_time - lead))
    .filter(|(_, at)| *at > now)
    .map(|(kind, at)| notification(booking, kind, at))
    .collect()
}

/// Follow-up sent a day after the service ends.
pub fn follow_up_for(booking: &Booking) -> ScheduledNotification {
    notification(
        booking,
        NotificationKind::BookingFollowUp,
        booking.end_time() + Duration::hours(24),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::BookingStatus;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn booking(at: &str) -> Booking {
        let created = dt("2025-06-01 08:00");
        Booking {
            id: "b1".to_string(),
            user_id: "user-1".to_string(),
            company_id: "co-1".to_string(),
            service_id: "svc-1".to_string(),
            pet_id: Some("pet-1".to_string()),
            employee_id: Some("emp-a".to_string()),
            date_time: dt(at),
            duration_minutes: 90,
            price: 45.0,
            status: BookingStatus::Pending,
            notes: None,
            payment_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_reminders_before_booking() {
        let reminders = reminders_for(&booking("2025-06-16 10:00"), dt("2025-06-10 08:00"));
        assert_eq!(reminders.len(), 2);
        assert_eq!(reminders[0].kind, NotificationKind::BookingReminder24h);
        assert_eq!(reminders[0].scheduled_at, dt("2025-06-15 10:00"));
        assert_eq!(reminders[1].scheduled_at, dt("2025-06-16 08:00"));
        assert_eq!(reminders[1].payload["booking_id"], "b1");
    }

    #[test]
    fn test_past_reminders_skipped() {
        let reminders = reminders_for(&booking("2025-06-16 10:00"), dt("2025-06-16 07:00"));
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].kind, NotificationKind::BookingReminder2h);

        assert!(reminders_for(&booking("2025-06-16 10:00"), dt("2025-06-16 09:00")).is_empty());
    }

    #[test]
    fn test_follow_up_after_service_end() {
        let follow_up = follow_up_for(&booking("2025-06-16 10:00"));
        assert_eq!(follow_up.kind, NotificationKind::BookingFollowUp);
        assert_eq!(follow_up.scheduled_at, dt("2025-06-17 11:30"));
    }

    #[tokio::test]
    async fn test_sqlite_sink_schedules_and_cancels() {
        let conn = db::init_db(":memory:").unwrap();
        let db = Arc::new(Mutex::new(conn));
        let sink = SqliteNotificationSink::new(db.clone());

        for reminder in reminders_for(&booking("2025-06-16 10:00"), dt("2025-06-10 08:00")) {
            sink.schedule(&reminder).await.unwrap();
        }
        {
            let conn = db.lock().unwrap();
            assert_eq!(queries::get_pending_notifications(&conn, "b1").unwrap().len(), 2);
        }

        sink.cancel_for_booking("b1").await.unwrap();
        let conn = db.lock().unwrap();
        assert!(queries::get_pending_notifications(&conn, "b1").unwrap().is_empty());
    }
}
