//! Subscription mirror
//!
//! Keeps a local, possibly stale copy of the user's plan and feeds its
//! message limit into the quota store.

pub mod mirror;
pub mod source;
pub mod types;

pub use mirror::SubscriptionMirror;
pub use source::{HttpSubscriptionSource, SubscriptionSource};
pub use types::{AuthoritativeState, CheckoutSession, Plan, SubscriptionSnapshot, Tier};
