//! Single-slot cancel-and-replace timer
//!
//! A [`PendingTimer`] holds at most one scheduled callback. Scheduling a new
//! one cancels the previous callback if it has not fired yet. Dropping the
//! timer cancels whatever is pending.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Debounce timer with at most one pending callback
///
/// Must be used from within a tokio runtime.
///
/// # Examples
///
/// ```
/// use chatquota::refresh::PendingTimer;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main(flavor = "current_thread", start_paused = true)]
/// async fn main() {
///     let fired = Arc::new(AtomicUsize::new(0));
///     let timer = PendingTimer::new();
///
///     for _ in 0..3 {
///         let fired = Arc::clone(&fired);
///         timer.schedule(Duration::from_millis(300), move || async move {
///             fired.fetch_add(1, Ordering::SeqCst);
///         });
///     }
///
///     tokio::time::sleep(Duration::from_millis(400)).await;
///     assert_eq!(fired.load(Ordering::SeqCst), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct PendingTimer {
    slot: Arc<Mutex<Slot>>,
}

impl PendingTimer {
    /// Creates an idle timer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `callback` after `delay`, replacing any pending callback
    pub fn schedule<F, Fut>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.lock();
            if let Some(previous) = slot.token.replace(token.clone()) {
                previous.cancel();
            }
            slot.generation += 1;
            slot.generation
        };

        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => {}

                _ = tokio::time::sleep(delay) => {
                    {
                        // cancel() fires the token under this lock, so a
                        // cancellation that raced the sleep is seen here
                        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.generation != generation || token.is_cancelled() {
                            return;
                        }
                        slot.token = None;
                    }
                    callback().await;
                }
            }
        });
    }

    /// Cancels the pending callback; returns true if one was pending
    pub fn cancel(&self) -> bool {
        match self.lock().token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a callback is scheduled and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.lock().token.is_some()
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || Arc::clone(&handle))
    }

    fn bump(count: Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send {
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (count, handle) = counter();
        let timer = PendingTimer::new();
        timer.schedule(Duration::from_millis(300), bump(handle()));

        settle(299).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        settle(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_callback() {
        let (count, handle) = counter();
        let timer = PendingTimer::new();
        timer.schedule(Duration::from_millis(300), bump(handle()));
        settle(200).await;
        timer.schedule(Duration::from_millis(300), bump(handle()));

        settle(200).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        settle(150).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_callback() {
        let (count, handle) = counter();
        let timer = PendingTimer::new();
        timer.schedule(Duration::from_millis(300), bump(handle()));

        assert!(timer.cancel());
        assert!(!timer.is_pending());
        assert!(!timer.cancel());

        settle(1_000).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_callback() {
        let (count, handle) = counter();
        {
            let timer = PendingTimer::new();
            timer.schedule(Duration::from_millis(300), bump(handle()));
        }
        settle(1_000).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_schedule_again_after_firing() {
        let (count, handle) = counter();
        let timer = PendingTimer::new();
        timer.schedule(Duration::from_millis(10), bump(handle()));
        settle(20).await;
        timer.schedule(Duration::from_millis(10), bump(handle()));
        settle(20).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_after_delay_elapsed_but_before_firing() {
        let (count, handle) = counter();
        let timer = PendingTimer::new();
        timer.schedule(Duration::from_millis(5), bump(handle()));

        {
            // Hold the slot so the elapsed task waits on it, then cancel
            // the way cancel() does while the task is still waiting
            let mut slot = timer.lock();
            std::thread::sleep(Duration::from_millis(50));
            if let Some(token) = slot.token.take() {
                token.cancel();
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_pending());
    }
}
