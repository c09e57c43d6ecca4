//! Visibility-driven refresh scheduling
//!
//! The controller turns foreground/background transitions into debounced
//! refreshes. Returning to the foreground schedules one refresh after the
//! debounce delay; leaving again before it fires cancels it, so a burst of
//! tab switches costs nothing.
//!
//! | from      | to        | paused | effect                        |
//! |-----------|-----------|--------|-------------------------------|
//! | `Hidden`  | `Visible` | no     | schedule (replacing pending)  |
//! | `Hidden`  | `Visible` | yes    | none                          |
//! | `Visible` | `Hidden`  | any    | cancel pending                |
//! | same      | same      | any    | none                          |

use crate::refresh::timer::PendingTimer;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Debounce delay used when none is configured
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Foreground state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The user is looking at the client
    Visible,
    /// The client is in the background
    Hidden,
}

/// Work run when a debounced refresh fires
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    /// Re-synchronizes with the authoritative backend
    async fn on_refresh(&self);
}

#[derive(Debug)]
struct ControllerState {
    visibility: Visibility,
    paused: bool,
}

/// Visibility state machine with a pause flag and a debounced refresh
pub struct RefreshController {
    target: Arc<dyn RefreshTarget>,
    debounce: Duration,
    state: Mutex<ControllerState>,
    timer: PendingTimer,
}

impl RefreshController {
    /// Creates a visible, unpaused controller
    pub fn new(target: Arc<dyn RefreshTarget>, debounce: Duration) -> Self {
        Self::with_visibility(target, debounce, Visibility::Visible)
    }

    /// Creates an unpaused controller starting in `visibility`
    pub fn with_visibility(
        target: Arc<dyn RefreshTarget>,
        debounce: Duration,
        visibility: Visibility,
    ) -> Self {
        Self {
            target,
            debounce,
            state: Mutex::new(ControllerState {
                visibility,
                paused: false,
            }),
            timer: PendingTimer::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds a visibility change into the state machine
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_visibility_change(&self, visibility: Visibility) {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut state.visibility, visibility);

        match (previous, visibility) {
            (Visibility::Hidden, Visibility::Visible) => {
                if state.paused {
                    tracing::debug!("Refresh paused, not scheduling");
                    return;
                }
                let target = Arc::clone(&self.target);
                self.timer
                    .schedule(self.debounce, move || async move { target.on_refresh().await });
                tracing::debug!(debounce_ms = self.debounce.as_millis() as u64, "Scheduled refresh");
            }
            (Visibility::Visible, Visibility::Hidden) => {
                if self.timer.cancel() {
                    tracing::debug!("Cancelled pending refresh");
                }
            }
            _ => {}
        }
    }

    /// Stops scheduling refreshes; visibility is still tracked
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Allows scheduling again
    ///
    /// Fires nothing by itself: the next transition to visible does.
    pub fn resume(&self) {
        self.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn visibility(&self) -> Visibility {
        self.lock().visibility
    }

    /// Whether a refresh is scheduled and has not fired yet
    pub fn has_pending_refresh(&self) -> bool {
        self.timer.is_pending()
    }
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RefreshController")
            .field("visibility", &state.visibility)
            .field("paused", &state.paused)
            .field("debounce", &self.debounce)
            .field("pending", &self.timer.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshTarget for CountingTarget {
        async fn on_refresh(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn hidden_controller() -> (RefreshController, Arc<CountingTarget>) {
        let target = Arc::new(CountingTarget::default());
        let controller =
            RefreshController::with_visibility(target.clone(), DEFAULT_DEBOUNCE, Visibility::Hidden);
        (controller, target)
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_becoming_visible_refreshes_after_debounce() {
        let (controller, target) = hidden_controller();
        controller.on_visibility_change(Visibility::Visible);
        assert!(controller.has_pending_refresh());

        settle(250).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
        settle(100).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
        assert!(!controller.has_pending_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flicker_within_debounce_makes_no_calls() {
        let (controller, target) = hidden_controller();
        controller.on_visibility_change(Visibility::Visible);
        settle(100).await;
        controller.on_visibility_change(Visibility::Hidden);

        settle(1_000).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
        assert!(!controller.has_pending_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_returns_collapse_to_one_call() {
        let (controller, target) = hidden_controller();
        for _ in 0..5 {
            controller.on_visibility_change(Visibility::Visible);
            settle(50).await;
            controller.on_visibility_change(Visibility::Hidden);
            settle(50).await;
        }
        controller.on_visibility_change(Visibility::Visible);

        settle(400).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_transitions_schedule_nothing() {
        let (controller, target) = hidden_controller();
        controller.pause();
        controller.on_visibility_change(Visibility::Visible);
        assert_eq!(controller.visibility(), Visibility::Visible);
        assert!(!controller.has_pending_refresh());

        settle(1_000).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_fires_nothing_until_next_return() {
        let (controller, target) = hidden_controller();
        controller.pause();
        controller.on_visibility_change(Visibility::Visible);
        controller.resume();
        assert!(!controller.is_paused());

        settle(1_000).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);

        controller.on_visibility_change(Visibility::Hidden);
        controller.on_visibility_change(Visibility::Visible);
        settle(400).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_to_visible_does_not_reschedule() {
        let target = Arc::new(CountingTarget::default());
        let controller = RefreshController::new(target.clone(), DEFAULT_DEBOUNCE);
        controller.on_visibility_change(Visibility::Visible);
        assert!(!controller.has_pending_refresh());

        settle(1_000).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_target_called_once() {
        let mut target = MockRefreshTarget::new();
        target.expect_on_refresh().times(1).return_const(());

        let controller = RefreshController::with_visibility(
            Arc::new(target),
            Duration::from_millis(50),
            Visibility::Hidden,
        );
        controller.on_visibility_change(Visibility::Visible);
        settle(100).await;
    }
}
