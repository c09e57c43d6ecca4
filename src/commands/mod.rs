//! Command handlers for the CLI
//!
//! - `status`: quota usage of the signed-in user
//! - `send`: one chat exchange through the quota gate
//! - `subscription`: refresh and checkout
//! - `history`: the local conversation cache

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::conversation::ConversationCache;
use crate::error::Result;
use crate::quota::QuotaStore;
use crate::refresh::{RefreshController, SyncCoordinator};
use crate::storage::{KeyValueStore, SqliteStore};
use crate::subscription::{HttpSubscriptionSource, SubscriptionMirror};
use std::sync::Arc;

pub mod history;
pub mod send;
pub mod status;
pub mod subscription;

/// Components shared by every command, wired from configuration
pub struct AppContext {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub quota: QuotaStore,
    pub cache: ConversationCache,
}

impl AppContext {
    /// Opens local storage and loads the quota of the configured user
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read.
    pub fn open(config: Config) -> Result<Self> {
        let store = match &config.storage.path {
            Some(path) => SqliteStore::new_with_path(path)?,
            None => SqliteStore::new()?,
        };
        tracing::debug!(path = %store.path().display(), "Using local store");

        let storage: Arc<dyn KeyValueStore> = Arc::new(store);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let quota = QuotaStore::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.quota.free_tier_limit,
        );
        quota.load(&config.user.id)?;
        let cache = ConversationCache::new(Arc::clone(&storage));

        Ok(Self {
            config,
            storage,
            clock,
            quota,
            cache,
        })
    }

    /// Builds a subscription mirror over the configured backend
    pub fn mirror(&self) -> Result<Arc<SubscriptionMirror>> {
        let source = HttpSubscriptionSource::new(
            &self.config.subscription.api_base,
            self.config.subscription.timeout(),
            self.config.subscription.api_key.clone(),
        )?;
        Ok(Arc::new(SubscriptionMirror::new(
            Arc::new(source),
            self.quota.clone(),
            self.config.user.id.clone(),
            self.config.quota.free_tier_limit,
        )))
    }

    /// Builds a visibility refresh controller for the configured user
    ///
    /// Each debounced refresh rolls the quota period if due and re-pulls the
    /// subscription. The delay comes from `refresh.debounce_ms`.
    pub fn refresh_controller(&self) -> Result<RefreshController> {
        let coordinator =
            SyncCoordinator::new(self.mirror()?, self.quota.clone(), Arc::clone(&self.clock));
        Ok(RefreshController::new(
            Arc::new(coordinator),
            self.config.refresh.debounce(),
        ))
    }
}
