//! Foreground-driven re-synchronization
//!
//! - [`timer`]: single-slot cancel-and-replace debounce timer
//! - [`controller`]: visible/hidden state machine with a pause flag
//! - [`coordinator`]: the refresh work itself

pub mod controller;
pub mod coordinator;
pub mod timer;

pub use controller::{RefreshController, RefreshTarget, Visibility, DEFAULT_DEBOUNCE};
pub use coordinator::{SyncCoordinator, SyncReport};
pub use timer::PendingTimer;
