//! Per-user message quota store
//!
//! [`QuotaStore`] owns the [`QuotaState`] of the signed-in user, persists it
//! to local storage after every mutation, and publishes each new state on a
//! `tokio::sync::watch` channel so observers see changes synchronously.
//!
//! The store is a cheap, cloneable handle; clones share the same state. All
//! mutations run to completion under one lock, so two mutations never
//! interleave.

use crate::clock::Clock;
use crate::error::{ChatQuotaError, Result};
use crate::quota::reset::{compute_next_reset, should_reset};
use crate::quota::state::{QuotaState, QUOTA_SCHEMA};
use crate::storage::KeyValueStore;
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

struct Inner {
    user_id: Option<String>,
    state: QuotaState,
}

/// Thread-safe quota store handle
#[derive(Clone)]
pub struct QuotaStore {
    inner: Arc<Mutex<Inner>>,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    free_tier_limit: u32,
    updates: Arc<watch::Sender<QuotaState>>,
}

impl QuotaStore {
    /// Creates a store with no user loaded yet
    ///
    /// Until [`QuotaStore::load`] runs, the state is an empty free-tier
    /// period starting now and nothing is persisted.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatquota::clock::SystemClock;
    /// use chatquota::quota::QuotaStore;
    /// use chatquota::storage::MemoryStore;
    /// use std::sync::Arc;
    ///
    /// let store = QuotaStore::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), 10);
    /// let state = store.load("user-1").unwrap();
    /// assert_eq!(state.count, 0);
    /// assert_eq!(state.limit, 10);
    /// assert!(store.can_send());
    /// ```
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        free_tier_limit: u32,
    ) -> Self {
        let state = QuotaState::new(free_tier_limit, clock.now());
        let (updates, _) = watch::channel(state.clone());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                user_id: None,
                state,
            })),
            storage,
            clock,
            free_tier_limit,
            updates: Arc::new(updates),
        }
    }

    fn storage_key(user_id: &str) -> String {
        format!("quota:{}", user_id)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads (or initializes) the quota state of `user_id`
    ///
    /// A missing or undecodable record starts a fresh free-tier period at the
    /// current time. The period is then reset if it has already elapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be read.
    pub fn load(&self, user_id: &str) -> Result<QuotaState> {
        let key = Self::storage_key(user_id);
        let now = self.clock.now();

        let state = match self.storage.get(&key)? {
            Some(raw) => match QuotaState::decode(&key, &raw) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable quota state");
                    telemetry::record_cache_decode_error(QUOTA_SCHEMA);
                    QuotaState::new(self.free_tier_limit, now)
                }
            },
            None => {
                tracing::info!(user_id, limit = self.free_tier_limit, "Initializing quota state");
                QuotaState::new(self.free_tier_limit, now)
            }
        };

        let mut inner = self.lock();
        inner.user_id = Some(user_id.to_string());
        inner.state = state;
        self.reset_if_elapsed(&mut inner, now);
        self.commit(&inner);
        Ok(inner.state.clone())
    }

    /// Returns a copy of the current state
    pub fn snapshot(&self) -> QuotaState {
        self.lock().state.clone()
    }

    /// User whose state is loaded, if any
    pub fn user_id(&self) -> Option<String> {
        self.lock().user_id.clone()
    }

    /// Subscribes to state changes
    ///
    /// The receiver always holds the latest state; every mutation publishes
    /// before the mutating call returns.
    pub fn subscribe(&self) -> watch::Receiver<QuotaState> {
        self.updates.subscribe()
    }

    /// Whether another message may be sent right now
    ///
    /// This is a guard, not a reservation: check it immediately before
    /// sending.
    pub fn can_send(&self) -> bool {
        self.lock().state.can_send_message()
    }

    /// Counts one sent message against the quota
    ///
    /// # Errors
    ///
    /// Returns [`ChatQuotaError::QuotaExceeded`] and leaves the count
    /// unchanged if the allowance is already used up.
    pub fn record_sent(&self) -> Result<QuotaState> {
        let mut inner = self.lock();
        if !inner.state.can_send_message() {
            telemetry::record_quota_exceeded();
            tracing::debug!(
                count = inner.state.count,
                limit = inner.state.limit,
                "Rejected send over quota"
            );
            return Err(ChatQuotaError::QuotaExceeded {
                count: inner.state.count,
                limit: inner.state.limit,
            }
            .into());
        }

        inner.state.count += 1;
        telemetry::record_message_sent();
        self.commit(&inner);
        Ok(inner.state.clone())
    }

    /// Replaces the limit of the current period without touching the count
    ///
    /// Only the subscription mirror calls this; nothing else decides limits.
    pub(crate) fn apply_plan_change(&self, new_limit: u32) -> QuotaState {
        let mut inner = self.lock();
        if inner.state.limit != new_limit {
            tracing::info!(
                old_limit = inner.state.limit,
                new_limit,
                count = inner.state.count,
                "Applying plan limit change"
            );
            telemetry::record_plan_change();
        }
        inner.state.limit = new_limit;
        self.commit(&inner);
        inner.state.clone()
    }

    /// Raises the local count to a server-reported count
    ///
    /// The count only moves up here; lowering it is reserved for resets.
    pub(crate) fn reconcile_server_count(&self, server_count: u32) -> QuotaState {
        let mut inner = self.lock();
        if server_count > inner.state.count {
            tracing::debug!(
                local = inner.state.count,
                server = server_count,
                "Adopting higher server message count"
            );
            inner.state.count = server_count;
            self.commit(&inner);
        }
        inner.state.clone()
    }

    /// Resets the period if it has elapsed at `now`
    ///
    /// Returns true if a reset happened. Calling this again with the same
    /// `now` is a no-op.
    pub fn maybe_reset(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let reset = self.reset_if_elapsed(&mut inner, now);
        if reset {
            self.commit(&inner);
        }
        reset
    }

    fn reset_if_elapsed(&self, inner: &mut Inner, now: DateTime<Utc>) -> bool {
        if !should_reset(now, inner.state.last_reset) {
            return false;
        }
        tracing::info!(
            previous_count = inner.state.count,
            last_reset = %inner.state.last_reset,
            "Quota period elapsed, resetting usage"
        );
        inner.state = QuotaState {
            count: 0,
            limit: inner.state.limit,
            last_reset: now,
            next_reset: compute_next_reset(now),
        };
        telemetry::record_quota_reset();
        true
    }

    /// Publishes the state and writes it through to storage
    fn commit(&self, inner: &Inner) {
        self.updates.send_replace(inner.state.clone());

        let Some(user_id) = inner.user_id.as_deref() else {
            return;
        };
        let key = Self::storage_key(user_id);
        let written = inner
            .state
            .encode()
            .and_then(|raw| self.storage.set(&key, &raw));
        if let Err(e) = written {
            tracing::warn!(error = %e, key, "Failed to persist quota state");
        }
    }
}

impl std::fmt::Debug for QuotaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("QuotaStore")
            .field("user_id", &inner.user_id)
            .field("state", &inner.state)
            .field("free_tier_limit", &self.free_tier_limit)
            .finish()
    }
}
