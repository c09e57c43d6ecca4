//! Message quota tracking
//!
//! - [`reset`]: calendar-month period boundaries
//! - [`state`]: the per-user usage record and its persisted form
//! - [`store`]: the store that gates sends and owns the state

pub mod reset;
pub mod state;
pub mod store;

pub use reset::{compute_next_reset, should_reset};
pub use state::QuotaState;
pub use store::QuotaStore;
