//! Error types for chatquota
//!
//! This module defines the error taxonomy for the quota, subscription and
//! conversation cache layers, using `thiserror` for ergonomic error handling.
//!
//! None of these errors is fatal to the process. Quota errors block a single
//! send, refresh errors degrade to the last known snapshot, and cache decode
//! errors discard only the corrupted entry.

use thiserror::Error;

/// Main error type for chatquota operations
#[derive(Error, Debug)]
pub enum ChatQuotaError {
    /// The user has used up the message allowance for the current period
    #[error("Quota exceeded: {count}/{limit} messages used this period")]
    QuotaExceeded {
        /// Messages already sent in the current period
        count: u32,
        /// Limit of the active plan
        limit: u32,
    },

    /// Pulling authoritative subscription state failed; the stale snapshot is kept
    #[error("Subscription refresh failed: {0}")]
    RefreshFailed(String),

    /// A persisted blob or one of its entries could not be decoded
    #[error("Cache decode error for '{key}': {message}")]
    CacheDecode {
        /// Storage key (and entry id, when known) that failed to decode
        key: String,
        /// What went wrong
        message: String,
    },

    /// Several plan changes raced; the most recent successful refresh wins
    #[error("Plan resolution ambiguous: {0}")]
    PlanResolutionAmbiguous(String),

    /// No conversation with the given id is cached
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Checkout could not be started with the payment collaborator
    #[error("Checkout error: {0}")]
    Checkout(String),

    /// Chat completion collaborator failed to produce a reply
    #[error("Completion error: {0}")]
    Completion(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local key-value storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for chatquota operations
///
/// Uses `anyhow::Error` so callers get context chains, while the concrete
/// [`ChatQuotaError`] stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns true if the error chain carries a [`ChatQuotaError::QuotaExceeded`]
pub fn is_quota_exceeded(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ChatQuotaError>(),
        Some(ChatQuotaError::QuotaExceeded { .. })
    )
}
