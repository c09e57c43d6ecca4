//! chatquota - usage-quota and local conversation cache library
//!
//! This library gates chat messages behind a monthly usage quota, mirrors the
//! user's subscription from an authoritative backend, and keeps
//! conversations in a local cache that survives restarts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `quota`: reset policy and the per-user quota store
//! - `subscription`: subscription mirror and its backend client
//! - `conversation`: conversation records, their persisted form and cache
//! - `refresh`: visibility-driven, debounced re-synchronization
//! - `session`: the send path tying quota and conversations together
//! - `completion`: chat completion collaborator
//! - `storage`: key-value storage backends
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```
//! use chatquota::clock::SystemClock;
//! use chatquota::quota::QuotaStore;
//! use chatquota::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let quota = QuotaStore::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), 10);
//! quota.load("user-1")?;
//! if quota.can_send() {
//!     // dispatch the message, then count it
//!     quota.record_sent()?;
//! }
//! assert_eq!(quota.snapshot().count, 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod clock;
pub mod commands;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod quota;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod subscription;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{ConversationCache, ConversationLibrary};
pub use error::{ChatQuotaError, Result};
pub use quota::{QuotaState, QuotaStore};
pub use refresh::{RefreshController, Visibility};
pub use session::ChatSession;
pub use subscription::SubscriptionMirror;
