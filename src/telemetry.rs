//! Usage and cache metrics
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line and
//! metric names live in one place. Without an installed recorder every call
//! is a no-op.
//!
//! # Metrics
//!
//! - `quota_messages_recorded_total`: Counter of messages counted against a quota
//! - `quota_exceeded_total`: Counter of sends rejected by the quota gate
//! - `quota_resets_total`: Counter of period resets
//! - `quota_plan_changes_total`: Counter of limit changes pushed into the store
//! - `subscription_refresh_total`: Counter of subscription refreshes by outcome
//! - `conversation_cache_decode_errors_total`: Counter of discarded cache entries by schema

use metrics::increment_counter;

/// Outcome label for `subscription_refresh_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Authoritative state was pulled and applied
    Success,
    /// The pull failed and the stale snapshot was kept
    Failed,
    /// Another refresh was in flight
    Coalesced,
}

impl RefreshOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::Coalesced => "coalesced",
        }
    }
}

/// Records one message counted against the quota
pub fn record_message_sent() {
    increment_counter!("quota_messages_recorded_total");
}

/// Records a send rejected by the quota gate
pub fn record_quota_exceeded() {
    increment_counter!("quota_exceeded_total");
}

/// Records a period reset
pub fn record_quota_reset() {
    increment_counter!("quota_resets_total");
}

/// Records a limit change pushed into the quota store
pub fn record_plan_change() {
    increment_counter!("quota_plan_changes_total");
}

/// Records the outcome of a subscription refresh
pub fn record_refresh(outcome: RefreshOutcome) {
    increment_counter!("subscription_refresh_total", "outcome" => outcome.as_str());
}

/// Records a cache entry discarded because it could not be decoded
pub fn record_cache_decode_error(schema: &str) {
    increment_counter!(
        "conversation_cache_decode_errors_total",
        "schema" => schema.to_string()
    );
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; otherwise
/// it is safe to call and does nothing.
///
/// # Examples
///
/// ```
/// use chatquota::telemetry::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
