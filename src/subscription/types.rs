use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Subscription tier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No paid plan
    Free,
    /// Entry paid plan
    Standard,
    /// Top paid plan
    Premium,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Free => "free",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        };
        f.write_str(name)
    }
}

/// A purchasable plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Plan identifier used for checkout
    pub id: String,
    /// Messages allowed per quota period
    pub message_limit: u32,
    /// Price in minor currency units (e.g. cents)
    pub price_amount: u64,
    /// ISO 4217 currency code
    pub price_currency: String,
    /// Feature flags unlocked by the plan
    #[serde(default)]
    pub features: BTreeSet<String>,
}

/// Point-in-time, possibly stale, copy of the user's subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    /// Active tier, if known
    pub tier: Option<Tier>,
    /// Active plan, if any
    pub plan: Option<Plan>,
    /// End of the paid billing period
    pub period_end: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    /// Message limit implied by this snapshot
    ///
    /// The plan's limit when a plan is active, otherwise the free-tier limit.
    pub fn message_limit(&self, free_tier_limit: u32) -> u32 {
        self.plan
            .as_ref()
            .map(|p| p.message_limit)
            .unwrap_or(free_tier_limit)
    }

    /// Whether the plan unlocks `feature`
    pub fn has_feature(&self, feature: &str) -> bool {
        self.plan
            .as_ref()
            .map(|p| p.features.contains(feature))
            .unwrap_or(false)
    }
}

/// Response of the authoritative subscription backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoritativeState {
    /// Active tier
    #[serde(default)]
    pub tier: Option<Tier>,
    /// Active plan
    #[serde(default)]
    pub plan: Option<Plan>,
    /// End of the paid billing period
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
    /// Messages the server has counted this period, when it reports one
    #[serde(default)]
    pub server_message_count: Option<u32>,
}

impl AuthoritativeState {
    /// Splits off the subscription part of the response
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            tier: self.tier,
            plan: self.plan.clone(),
            period_end: self.period_end,
        }
    }
}

/// Checkout session handed back by the payment collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Opaque session identifier
    pub session_id: String,
    /// Where to send the user to pay
    pub url: String,
}
