//! Local conversation cache
//!
//! - [`types`]: conversations, messages and index entries
//! - [`codec`]: versioned persisted form with timestamp revival
//! - [`cache`]: the index and record blobs over a key-value store
//! - [`library`]: in-memory working set with a guarded persist

pub mod cache;
pub mod codec;
pub mod library;
pub mod types;

pub use cache::ConversationCache;
pub use library::ConversationLibrary;
pub use types::{ChatMessage, ConversationIndexEntry, ConversationRecord, Role};
