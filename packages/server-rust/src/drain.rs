//! In-flight work tracking with a bounded wait for idleness.
//!
//! An atomic counter with RAII guards, shared by the server's graceful shutdown
//! and by publish channels that must not be released while a publish is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicU64,
    /// Signalled when the last guard drops.
    idle: Notify,
}

/// Counts units of in-flight work.
#[derive(Debug, Clone, Default)]
pub struct DrainTracker {
    inner: Arc<Inner>,
}

impl DrainTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one unit of work as started. The unit ends when the guard drops,
    /// including during unwinding.
    #[must_use]
    pub fn guard(&self) -> DrainGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        DrainGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current number of live guards.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Waits until no guard is alive, up to `timeout`.
    ///
    /// Returns `true` if the tracker became idle, `false` if the timeout expired first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                // Register before checking so a release in between is not missed.
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

/// Decrements the owning tracker when dropped.
#[derive(Debug)]
pub struct DrainGuard {
    inner: Arc<Inner>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_increment_and_decrement() {
        let tracker = DrainTracker::new();
        let a = tracker.guard();
        let b = tracker.guard();
        assert_eq!(tracker.in_flight(), 2);
        drop(a);
        assert_eq!(tracker.in_flight(), 1);
        drop(b);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn clones_share_the_counter() {
        let tracker = DrainTracker::new();
        let clone = tracker.clone();
        let _guard = clone.guard();
        assert_eq!(tracker.in_flight(), 1);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_idle() {
        let tracker = DrainTracker::new();
        assert!(tracker.wait_idle(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn wait_idle_sees_late_release() {
        let tracker = DrainTracker::new();
        let guard = tracker.guard();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert!(tracker.wait_idle(Duration::from_secs(2)).await);
        release.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_wakes_on_release() {
        let tracker = DrainTracker::new();
        let guard = tracker.guard();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            drop(guard);
        });

        let start = tokio::time::Instant::now();
        assert!(tracker.wait_idle(Duration::from_secs(3600)).await);
        assert_eq!(start.elapsed(), Duration::from_millis(3));
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_busy() {
        let tracker = DrainTracker::new();
        let _guard = tracker.guard();
        assert!(!tracker.wait_idle(Duration::from_millis(30)).await);
    }
}
