//! Expiry timers.
//!
//! A [`ScheduledExpiry`] is the handle stored next to the session; dropping or
//! cancelling it guarantees the tick never fires.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// Arms a one-shot tick at a deadline
pub trait ExpiryScheduler: Send + Sync {
    fn schedule(&self, deadline: DateTime<Utc>) -> ScheduledExpiry;
}

/// Cancellable handle for one scheduled tick
#[derive(Debug)]
pub struct ScheduledExpiry {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ScheduledExpiry {
    /// Handle with no task behind it; the owner decides when the tick fires
    #[cfg(test)]
    pub(crate) fn untimed(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            task: None,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ScheduledExpiry {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Sleeps on the tokio runtime and sends the deadline on a channel when it passes
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    ticks: UnboundedSender<DateTime<Utc>>,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ticks: UnboundedSender<DateTime<Utc>>) -> Self {
        Self { clock, ticks }
    }
}

impl ExpiryScheduler for TokioScheduler {
    fn schedule(&self, deadline: DateTime<Utc>) -> ScheduledExpiry {
        let cancelled = Arc::new(AtomicBool::new(false));
        let wait = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let flag = cancelled.clone();
        let ticks = self.ticks.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if !flag.load(Ordering::SeqCst) && ticks.send(deadline).is_err() {
                log::debug!("Expiry tick dropped: receiver closed");
            }
        });

        ScheduledExpiry {
            cancelled,
            task: Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::testing::ManualScheduler;
    use chrono::Duration;

    #[test]
    fn test_manual_scheduler_tracks_cancellation() {
        let scheduler = ManualScheduler::new();
        let deadline = Utc::now();
        let mut first = scheduler.schedule(deadline);
        let _second = scheduler.schedule(deadline + Duration::seconds(1));
        first.cancel();
        assert_eq!(scheduler.pending(), vec![deadline + Duration::seconds(1)]);
        assert_eq!(scheduler.scheduled_count(), 2);
    }

    #[test]
    fn test_drop_cancels() {
        let scheduler = ManualScheduler::new();
        drop(scheduler.schedule(Utc::now()));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_tokio_scheduler_fires_past_deadline_immediately() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Arc::new(SystemClock), tx);
        let deadline = Utc::now() - Duration::seconds(5);
        let _handle = scheduler.schedule(deadline);
        assert_eq!(rx.recv().await, Some(deadline));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_cancelled_never_fires() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(Arc::new(SystemClock), tx);
        let mut handle = scheduler.schedule(Utc::now() + Duration::milliseconds(20));
        handle.cancel();
        drop(scheduler);
        drop(handle);
        // Sender side is gone once the aborted task is dropped
        let received = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)));
    }
}
