use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

/// Shared cancellation flag.
///
/// Worker threads poll it with [`StopFlag::is_stopped`] and park in
/// [`StopFlag::sleep`], which returns early once the flag is set. The
/// controller awaits it with [`StopFlag::stopped`].
#[derive(Clone, Debug, Default)]
pub struct StopFlag {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
    notify: Notify,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Take the lock so a worker between its flag check and its wait
        // cannot miss the wakeup.
        drop(self.inner.lock.lock().unwrap_or_else(|e| e.into_inner()));
        self.inner.wakeup.notify_all();
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Blocks the calling thread for `duration` or until the flag is set.
    /// Returns `true` when the flag is set.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        let _ = self
            .inner
            .wakeup
            .wait_timeout_while(guard, duration, |_| !self.is_stopped())
            .unwrap_or_else(|e| e.into_inner());
        self.is_stopped()
    }

    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sleep_runs_full_duration_when_not_stopped() {
        let flag = StopFlag::new();
        let start = Instant::now();
        assert!(!flag.sleep(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_stop_wakes_sleeping_thread() {
        let flag = StopFlag::new();
        let sleeper = {
            let flag = flag.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                let stopped = flag.sleep(Duration::from_secs(30));
                (stopped, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        flag.stop();

        let (stopped, elapsed) = sleeper.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let flag = StopFlag::new();
        flag.stop();
        flag.stop();
        assert!(flag.is_stopped());
        assert!(flag.sleep(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let flag = StopFlag::new();
        let waiter = tokio::spawn({
            let flag = flag.clone();
            async move { flag.stopped().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_immediately_when_already_stopped() {
        let flag = StopFlag::new();
        flag.stop();
        tokio::time::timeout(Duration::from_millis(100), flag.stopped())
            .await
            .expect("stopped() should resolve");
    }
}
