//! Refresh work run when the client returns to the foreground

use crate::clock::Clock;
use crate::error::Result;
use crate::quota::{QuotaState, QuotaStore};
use crate::refresh::controller::RefreshTarget;
use crate::subscription::{SubscriptionMirror, SubscriptionSnapshot};
use async_trait::async_trait;
use std::sync::Arc;

/// Rolls the quota period if it elapsed, then pulls the subscription
///
/// The reset never depends on the pull succeeding. Running it first means
/// a server-reported count adopted by the pull is kept for the new period.
pub struct SyncCoordinator {
    mirror: Arc<SubscriptionMirror>,
    quota: QuotaStore,
    clock: Arc<dyn Clock>,
}

/// Outcome of one [`SyncCoordinator::sync`]
#[derive(Debug)]
pub struct SyncReport {
    /// Refreshed snapshot, or the refresh error
    pub subscription: Result<SubscriptionSnapshot>,
    /// Whether the quota period was reset
    pub reset: bool,
    /// Quota state after the sync
    pub quota: QuotaState,
}

impl SyncCoordinator {
    pub fn new(mirror: Arc<SubscriptionMirror>, quota: QuotaStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            mirror,
            quota,
            clock,
        }
    }

    /// Runs one refresh cycle
    pub async fn sync(&self) -> SyncReport {
        let reset = self.quota.maybe_reset(self.clock.now());
        let subscription = self.mirror.refresh().await;
        SyncReport {
            subscription,
            reset,
            quota: self.quota.snapshot(),
        }
    }
}

#[async_trait]
impl RefreshTarget for SyncCoordinator {
    async fn on_refresh(&self) {
        let report = self.sync().await;
        match &report.subscription {
            Ok(_) => tracing::debug!(reset = report.reset, "Visibility refresh complete"),
            Err(e) => tracing::debug!(
                reset = report.reset,
                error = %e,
                "Visibility refresh kept stale subscription"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::subscription::source::MockSubscriptionSource;
    use crate::subscription::{AuthoritativeState, Plan, Tier};
    use chrono::{Duration, TimeZone, Utc};

    fn setup(source: MockSubscriptionSource) -> (SyncCoordinator, QuotaStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap(),
        ));
        let quota = QuotaStore::new(Arc::new(MemoryStore::new()), clock.clone(), 10);
        quota.load("u1").unwrap();
        let mirror = Arc::new(SubscriptionMirror::new(
            Arc::new(source),
            quota.clone(),
            "u1",
            10,
        ));
        (
            SyncCoordinator::new(mirror, quota.clone(), clock.clone()),
            quota,
            clock,
        )
    }

    #[tokio::test]
    async fn test_sync_resets_elapsed_period_then_applies_plan() {
        let mut source = MockSubscriptionSource::new();
        source.expect_fetch_current().returning(|_| {
            Ok(AuthoritativeState {
                tier: Some(Tier::Premium),
                plan: Some(Plan {
                    id: "premium".into(),
                    message_limit: 500,
                    price_amount: 1999,
                    price_currency: "USD".into(),
                    features: Default::default(),
                }),
                period_end: None,
                server_message_count: Some(4),
            })
        });
        let (coordinator, quota, clock) = setup(source);
        quota.record_sent().unwrap();

        clock.advance(Duration::days(30));
        let report = coordinator.sync().await;

        assert!(report.subscription.is_ok());
        assert!(report.reset);
        assert_eq!(report.quota.limit, 500);
        // The count the server reported for the new period survives the reset
        assert_eq!(report.quota.count, 4);
        assert_eq!(quota.snapshot(), report.quota);
    }

    #[tokio::test]
    async fn test_sync_resets_even_when_refresh_fails() {
        let mut source = MockSubscriptionSource::new();
        source
            .expect_fetch_current()
            .returning(|_| Err(anyhow::anyhow!("offline")));
        let (coordinator, quota, clock) = setup(source);
        quota.record_sent().unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let report = coordinator.sync().await;

        assert!(report.subscription.is_err());
        assert!(report.reset);
        assert_eq!(quota.snapshot().count, 0);
    }

    #[tokio::test]
    async fn test_on_refresh_within_period_keeps_count() {
        let mut source = MockSubscriptionSource::new();
        source
            .expect_fetch_current()
            .times(1)
            .returning(|_| Ok(AuthoritativeState::default()));
        let (coordinator, quota, _) = setup(source);
        quota.record_sent().unwrap();

        coordinator.on_refresh().await;
        assert_eq!(quota.snapshot().count, 1);
    }
}
