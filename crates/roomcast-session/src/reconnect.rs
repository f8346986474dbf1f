//! One-shot reconnect timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Schedules at most one pending reconnect at a time.
///
/// A lost connection can be reported more than once (a read error
/// followed by the close it causes, say). Only the first report arms the
/// timer; later ones are ignored until it fires. Whether to reconnect is
/// decided when the timer fires, not when it is armed, so a session that
/// goes inactive in the meantime simply does nothing.
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Arms the timer. After the delay, `reconnect` runs if `is_active`
    /// still returns true.
    ///
    /// Returns `false` without doing anything if a reconnect is already
    /// pending. Must be called inside a Tokio runtime.
    pub fn schedule<A, R>(&self, is_active: A, reconnect: R) -> bool
    where
        A: FnOnce() -> bool + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!("reconnect already scheduled");
            return false;
        }
        tracing::debug!(delay = ?self.delay, "reconnect scheduled");

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            if is_active() {
                tracing::info!("reconnecting");
                reconnect();
            } else {
                tracing::debug!("session inactive, reconnect skipped");
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        (calls, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(3));
        let (calls, reconnect) = counter();
        let (_, duplicate) = counter();

        assert!(scheduler.schedule(|| true, reconnect));
        assert!(!scheduler.schedule(|| true, duplicate));
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_at_fire_time_skips_reconnect() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(3));
        let active = Arc::new(AtomicBool::new(true));
        let (calls, reconnect) = counter();

        let flag = Arc::clone(&active);
        scheduler.schedule(move || flag.load(Ordering::SeqCst), reconnect);
        active.store(false, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_rearm_after_firing() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(1));
        let (calls, first) = counter();
        scheduler.schedule(|| true, first);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let c = Arc::clone(&calls);
        assert!(scheduler.schedule(|| true, move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
