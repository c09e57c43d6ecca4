//! Quota state for a single user

use crate::error::{ChatQuotaError, Result};
use crate::quota::reset::compute_next_reset;
use crate::storage::envelope::{self, Payload};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Schema tag of persisted quota blobs
pub const QUOTA_SCHEMA: &str = "quota_state";

/// Message usage for the current quota period
///
/// `percent_used` and `can_send_message` are derived on every call and never
/// stored, so they cannot drift from `count` and `limit`.
///
/// # Examples
///
/// ```
/// use chatquota::quota::QuotaState;
/// use chrono::Utc;
///
/// let mut state = QuotaState::new(10, Utc::now());
/// state.count = 9;
/// assert!(state.can_send_message());
/// assert_eq!(state.percent_used(), 90);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    /// Messages sent in the current period
    pub count: u32,

    /// Messages allowed in the current period
    pub limit: u32,

    /// Start of the current period
    pub last_reset: DateTime<Utc>,

    /// End of the current period
    pub next_reset: DateTime<Utc>,
}

impl QuotaState {
    /// Creates an empty period starting at `last_reset`
    pub fn new(limit: u32, last_reset: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            limit,
            last_reset,
            next_reset: compute_next_reset(last_reset),
        }
    }

    /// Share of the allowance used, rounded to a whole percent
    ///
    /// Returns 0 when `limit` is 0 and saturates at 100 when a plan downgrade
    /// left `count` above `limit`.
    pub fn percent_used(&self) -> u8 {
        if self.limit == 0 {
            return 0;
        }
        let pct = (f64::from(self.count) / f64::from(self.limit) * 100.0).round();
        pct.min(100.0) as u8
    }

    /// Whether another message may be sent in this period
    pub fn can_send_message(&self) -> bool {
        self.count < self.limit
    }

    /// Messages left in this period
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// Serializes the state into a versioned blob
    pub fn encode(&self) -> Result<String> {
        envelope::seal(
            QUOTA_SCHEMA,
            json!({
                "count": self.count,
                "limit": self.limit,
                "lastReset": envelope::encode_timestamp(&self.last_reset),
            }),
        )
    }

    /// Revives a state persisted under `key`
    ///
    /// `next_reset` is not trusted from storage; it is recomputed from
    /// `last_reset`.
    pub fn decode(key: &str, raw: &str) -> std::result::Result<Self, ChatQuotaError> {
        let data = match envelope::open(key, QUOTA_SCHEMA, raw)? {
            Payload::Current(data) | Payload::Legacy(data) => data,
        };
        let fail = |message: String| ChatQuotaError::CacheDecode {
            key: key.to_string(),
            message,
        };

        let count = read_u32(&data, "count").map_err(fail)?;
        let limit = read_u32(&data, "limit").map_err(fail)?;
        let last_reset =
            envelope::revive_timestamp("lastReset", data.get("lastReset").unwrap_or(&Value::Null))
                .map_err(fail)?;

        Ok(Self {
            count,
            limit,
            last_reset,
            next_reset: compute_next_reset(last_reset),
        })
    }
}

fn read_u32(data: &Value, field: &str) -> std::result::Result<u32, String> {
    data.get(field)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| format!("field '{}' is missing or not a non-negative integer", field))
}
