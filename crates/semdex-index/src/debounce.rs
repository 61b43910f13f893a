//! Single re-armable timer.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs a task once `delay` has passed without another [`arm`](Self::arm).
///
/// Arming aborts the previously scheduled task, so at most one is pending.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` after the delay, replacing any pending one.
    pub fn arm<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let mut slot = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(prev) = slot.replace(handle) {
            prev.abort();
        }
    }

    /// Drop the pending task, if any.
    pub fn cancel(&self) {
        let mut slot = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(prev) = slot.take() {
            prev.abort();
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let d = Debouncer::new(Duration::from_millis(500));
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let hits = Arc::clone(&hits);
            d.arm(async move {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(d.is_armed());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!d.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let d = Debouncer::new(Duration::from_millis(100));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        d.arm(async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        d.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_arms_fire_each_time() {
        let d = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = Arc::clone(&hits);
            d.arm(async move {
                h.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
