//! Local read-through cache of the user's subscription
//!
//! The mirror is the only writer of the quota limit. It pushes a new limit
//! into the [`QuotaStore`] only after a refresh confirms a different plan,
//! and it never forgets a known plan because a refresh failed.

use crate::error::{ChatQuotaError, Result};
use crate::quota::QuotaStore;
use crate::subscription::source::SubscriptionSource;
use crate::subscription::types::{AuthoritativeState, CheckoutSession, SubscriptionSnapshot};
use crate::telemetry::{self, RefreshOutcome};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MirrorState {
    snapshot: SubscriptionSnapshot,
    last_pushed_limit: Option<u32>,
    last_refreshed: Option<DateTime<Utc>>,
    stale: bool,
    pending_checkouts: Vec<String>,
}

/// Clears the in-flight flag when the refresh future completes or is dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Subscription mirror for one signed-in user
pub struct SubscriptionMirror {
    source: Arc<dyn SubscriptionSource>,
    quota: QuotaStore,
    user_id: String,
    free_tier_limit: u32,
    state: Mutex<MirrorState>,
    in_flight: AtomicBool,
}

impl SubscriptionMirror {
    /// Creates a mirror with an empty snapshot
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        quota: QuotaStore,
        user_id: impl Into<String>,
        free_tier_limit: u32,
    ) -> Self {
        Self {
            source,
            quota,
            user_id: user_id.into(),
            free_tier_limit,
            state: Mutex::new(MirrorState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MirrorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last known snapshot
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        self.lock().snapshot.clone()
    }

    /// True if the most recent refresh failed and the snapshot may be outdated
    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// When the snapshot was last confirmed by the backend
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.lock().last_refreshed
    }

    /// Plans with a checkout opened but not yet confirmed by a refresh
    pub fn pending_checkouts(&self) -> Vec<String> {
        self.lock().pending_checkouts.clone()
    }

    /// Re-pulls authoritative state and reconciles it into the quota store
    ///
    /// A call made while another refresh is in flight does not fetch again;
    /// it returns the last known snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ChatQuotaError::RefreshFailed`] if the backend could not be
    /// reached. The previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<SubscriptionSnapshot> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(user_id = %self.user_id, "Refresh already in flight, coalescing");
            telemetry::record_refresh(RefreshOutcome::Coalesced);
            return Ok(self.snapshot());
        }
        let _in_flight = InFlight(&self.in_flight);

        match self.source.fetch_current(&self.user_id).await {
            Ok(state) => {
                telemetry::record_refresh(RefreshOutcome::Success);
                Ok(self.apply(state))
            }
            Err(e) => {
                telemetry::record_refresh(RefreshOutcome::Failed);
                self.lock().stale = true;
                tracing::warn!(
                    user_id = %self.user_id,
                    error = %format!("{:#}", e),
                    "Subscription refresh failed, keeping last known snapshot"
                );
                Err(ChatQuotaError::RefreshFailed(format!("{:#}", e)).into())
            }
        }
    }

    fn apply(&self, state: AuthoritativeState) -> SubscriptionSnapshot {
        let snapshot = state.snapshot();
        let limit = snapshot.message_limit(self.free_tier_limit);

        let push_limit = {
            let mut mirror = self.lock();
            let resolved_plan = snapshot.plan.as_ref().map(|p| p.id.as_str());

            if mirror.pending_checkouts.len() > 1 {
                let err = ChatQuotaError::PlanResolutionAmbiguous(format!(
                    "{} checkouts pending ({}), backend resolved {:?}",
                    mirror.pending_checkouts.len(),
                    mirror.pending_checkouts.join(", "),
                    resolved_plan
                ));
                tracing::warn!(error = %err, "Accepting refreshed plan");
                mirror.pending_checkouts.clear();
            } else if let Some(plan_id) = resolved_plan {
                mirror.pending_checkouts.retain(|p| p != plan_id);
            }

            if mirror.snapshot != snapshot {
                tracing::info!(
                    user_id = %self.user_id,
                    tier = ?snapshot.tier,
                    plan = ?resolved_plan,
                    "Subscription changed"
                );
            }
            mirror.snapshot = snapshot.clone();
            mirror.stale = false;
            mirror.last_refreshed = Some(Utc::now());

            let changed = mirror.last_pushed_limit != Some(limit);
            mirror.last_pushed_limit = Some(limit);
            changed
        };

        if push_limit {
            self.quota.apply_plan_change(limit);
        }
        if let Some(server_count) = state.server_message_count {
            self.quota.reconcile_server_count(server_count);
        }

        snapshot
    }

    /// Opens a checkout for `plan_id` with the payment collaborator
    ///
    /// Local plan state is untouched: the new plan only takes effect after a
    /// later [`refresh`](Self::refresh) confirms the payment.
    ///
    /// # Errors
    ///
    /// Returns [`ChatQuotaError::Checkout`] if the collaborator refuses.
    pub async fn start_checkout(&self, plan_id: &str) -> Result<CheckoutSession> {
        let session = self
            .source
            .create_checkout(&self.user_id, plan_id)
            .await
            .map_err(|e| ChatQuotaError::Checkout(format!("{:#}", e)))?;

        let mut mirror = self.lock();
        if !mirror.pending_checkouts.iter().any(|p| p == plan_id) {
            mirror.pending_checkouts.push(plan_id.to_string());
        }
        tracing::info!(
            user_id = %self.user_id,
            plan_id,
            session_id = %session.session_id,
            "Checkout started"
        );
        Ok(session)
    }
}
