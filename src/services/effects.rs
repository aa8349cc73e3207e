use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::models::ScheduledNotification;
use crate::services::notifications::NotificationSink;
use crate::services::payments::PaymentCollaborator;

/// Best-effort work triggered by booking changes. None of it takes part in
/// the booking transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    ScheduleNotification(ScheduledNotification),
    CancelScheduled { booking_id: String },
    MarkServiceCompleted { booking_id: String },
}

impl SideEffect {
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::ScheduleNotification(_) => "schedule_notification",
            SideEffect::CancelScheduled { .. } => "cancel_scheduled",
            SideEffect::MarkServiceCompleted { .. } => "mark_service_completed",
        }
    }

    pub fn booking_id(&self) -> &str {
        match self {
            SideEffect::ScheduleNotification(n) => &n.booking_id,
            SideEffect::CancelScheduled { booking_id }
            | SideEffect::MarkServiceCompleted { booking_id } => booking_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub effect: SideEffect,
    pub attempts: u32,
    pub error: String,
}

/// Bounded log of effects that could not be delivered. Oldest entries are
/// dropped once full.
#[derive(Clone)]
pub struct DeadLetters {
    entries: Arc<Mutex<VecDeque<DeadLetter>>>,
    capacity: usize,
}

impl DeadLetters {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, letter: DeadLetter) {
        tracing::error!(
            effect = letter.effect.label(),
            booking_id = letter.effect.booking_id(),
            attempts = letter.attempts,
            error = %letter.error,
            "side effect dead-lettered"
        );
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(letter);
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Producer side of the side-effect queue. Submission never blocks.
#[derive(Clone)]
pub struct EffectQueue {
    tx: mpsc::Sender<SideEffect>,
    dead_letters: DeadLetters,
}

impl EffectQueue {
    pub fn new(capacity: usize, dead_letters: DeadLetters) -> (Self, mpsc::Receiver<SideEffect>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dead_letters }, rx)
    }

    pub fn submit(&self, effect: SideEffect) {
        match self.tx.try_send(effect) {
            Ok(()) => {}
            Err(TrySendError::Full(effect)) => self.dead_letters.push(DeadLetter {
                effect,
                attempts: 0,
                error: "effect queue full".to_string(),
            }),
            Err(TrySendError::Closed(effect)) => self.dead_letters.push(DeadLetter {
                effect,
                attempts: 0,
                error: "effect worker stopped".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

pub struct EffectWorker {
    notifications: Arc<dyn NotificationSink>,
    payments: Arc<dyn PaymentCollaborator>,
    policy: RetryPolicy,
    dead_letters: DeadLetters,
}

impl EffectWorker {
    pub fn new(
        notifications: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentCollaborator>,
        policy: RetryPolicy,
        dead_letters: DeadLetters,
    ) -> Self {
        Self {
            notifications,
            payments,
            policy,
            dead_letters,
        }
    }

    /// Drains the queue in submission order until every producer is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<SideEffect>) {
        while let Some(effect) = rx.recv().await {
            self.deliver(effect).await;
        }
        tracing::info!("effect worker stopped");
    }

    async fn deliver(&self, effect: SideEffect) {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.apply(&effect).await {
                Ok(()) => return,
                Err(e) if attempt == max_attempts => {
                    self.dead_letters.push(DeadLetter {
                        effect,
                        attempts: attempt,
                        error: format!("{e:#}"),
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        effect = effect.label(),
                        booking_id = effect.booking_id(),
                        attempt,
                        error = %e,
                        "side effect failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
            }
        }
    }

    async fn apply(&self, effect: &SideEffect) -> anyhow::Result<()> {
        match effect {
            SideEffect::ScheduleNotification(notification) => {
                self.notifications.schedule(notification).await
            }
            SideEffect::CancelScheduled { booking_id } => {
                self.notifications.cancel_for_booking(booking_id).await
            }
            SideEffect::MarkServiceCompleted { booking_id } => {
                self.payments.mark_service_completed(booking_id).await
            }
        }
    }
}

pub fn spawn_effect_worker(worker: EffectWorker, rx: mpsc::Receiver<SideEffect>) -> JoinHandle<()> {
    tokio::spawn(worker.run(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        scheduled: Mutex<Vec<String>>,
        cancelled: Mutex<Vec<String>>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn schedule(&self, notification: &ScheduledNotification) -> anyhow::Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("sink unavailable");
            }
            self.scheduled.lock().unwrap().push(notification.booking_id.clone());
            Ok(())
        }

        async fn cancel_for_booking(&self, booking_id: &str) -> anyhow::Result<()> {
            self.cancelled.lock().unwrap().push(booking_id.to_string());
            Ok(())
        }
    }

    struct FailingPayments;

    #[async_trait]
    impl PaymentCollaborator for FailingPayments {
        async fn mark_service_completed(&self, _booking_id: &str) -> anyhow::Result<()> {
            anyhow::bail!("payments offline")
        }
    }

    fn reminder(booking_id: &str) -> SideEffect {
        SideEffect::ScheduleNotification(ScheduledNotification {
            user_id: "user-1".to_string(),
            booking_id: booking_id.to_string(),
            kind: NotificationKind::BookingReminder2h,
            scheduled_at: NaiveDateTime::parse_from_str("2025-06-16 08:00", "%Y-%m-%d %H:%M").unwrap(),
            payload: serde_json::json!({}),
        })
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let dead = DeadLetters::new(10);
        let (queue, rx) = EffectQueue::new(8, dead.clone());
        let worker = EffectWorker::new(sink.clone(), Arc::new(FailingPayments), policy(3), dead.clone());

        queue.submit(reminder("b1"));
        queue.submit(SideEffect::CancelScheduled { booking_id: "b1".to_string() });
        queue.submit(reminder("b2"));
        drop(queue);

        spawn_effect_worker(worker, rx).await.unwrap();

        assert_eq!(*sink.scheduled.lock().unwrap(), vec!["b1", "b2"]);
        assert_eq!(*sink.cancelled.lock().unwrap(), vec!["b1"]);
        assert!(dead.is_empty());
    }

    #[tokio::test]
    async fn test_worker_retries_transient_failures() {
        let sink = Arc::new(RecordingSink::default());
        sink.failures_left.store(2, Ordering::SeqCst);
        let dead = DeadLetters::new(10);
        let (queue, rx) = EffectQueue::new(8, dead.clone());
        let worker = EffectWorker::new(sink.clone(), Arc::new(FailingPayments), policy(3), dead.clone());

        queue.submit(reminder("b1"));
        drop(queue);
        worker.run(rx).await;

        assert_eq!(*sink.scheduled.lock().unwrap(), vec!["b1"]);
        assert!(dead.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_effect_is_dead_lettered() {
        let sink = Arc::new(RecordingSink::default());
        let dead = DeadLetters::new(10);
        let (queue, rx) = EffectQueue::new(8, dead.clone());
        let worker = EffectWorker::new(sink, Arc::new(FailingPayments), policy(2), dead.clone());

        queue.submit(SideEffect::MarkServiceCompleted { booking_id: "b9".to_string() });
        drop(queue);
        worker.run(rx).await;

        let letters = dead.snapshot();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 2);
        assert_eq!(letters[0].effect.booking_id(), "b9");
        assert!(letters[0].error.contains("payments offline"));
    }

    #[test]
    fn test_full_queue_dead_letters_without_blocking() {
        let dead = DeadLetters::new(10);
        let (queue, _rx) = EffectQueue::new(1, dead.clone());
        queue.submit(reminder("b1"));
        queue.submit(reminder("b2"));

        let letters = dead.snapshot();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].effect.booking_id(), "b2");
        assert_eq!(letters[0].attempts, 0);
    }

    #[test]
    fn test_closed_queue_dead_letters() {
        let dead = DeadLetters::new(10);
        let (queue, rx) = EffectQueue::new(4, dead.clone());
        drop(rx);
        queue.submit(reminder("b1"));
        assert_eq!(dead.len(), 1);
    }

    #[test]
    fn test_dead_letters_are_bounded() {
        let dead = DeadLetters::new(2);
        for id in ["b1", "b2", "b3"] {
            dead.push(DeadLetter {
                effect: reminder(id),
                attempts: 1,
                error: "boom".to_string(),
            });
        }
        let ids: Vec<_> = dead.snapshot().iter().map(|l| l.effect.booking_id().to_string()).collect();
        assert_eq!(ids, vec!["b2", "b3"]);
    }
}
