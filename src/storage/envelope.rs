//! Versioned, schema-tagged envelopes for persisted blobs
//!
//! Every blob written to local storage is wrapped as
//!
//! ```json
//! { "schema": "conversation_index", "version": 1, "data": ... }
//! ```
//!
//! Temporal values inside `data` are RFC 3339 strings. JSON has no timestamp
//! type, so readers revive them explicitly with [`revive_timestamp`] instead
//! of trusting field names.
//!
//! Blobs written before envelopes existed are bare JSON values; [`open`]
//! hands those back as [`Payload::Legacy`] so each reader can migrate them.

use crate::error::{ChatQuotaError, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope version written by this build
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    schema: String,
    version: u32,
    data: Value,
}

/// Decoded body of a persisted blob
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body of an envelope with the expected schema and a supported version
    Current(Value),
    /// Unwrapped blob from before envelopes were introduced
    Legacy(Value),
}

/// Wraps `data` in an envelope tagged with `schema` and serializes it
pub fn seal(schema: &str, data: Value) -> Result<String> {
    let envelope = Envelope {
        schema: schema.to_string(),
        version: CURRENT_VERSION,
        data,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parses a raw blob stored under `key` and checks it carries `schema`
///
/// # Errors
///
/// Returns [`ChatQuotaError::CacheDecode`] if the blob is not JSON, carries a
/// different schema, or was written by a newer version.
pub fn open(key: &str, schema: &str, raw: &str) -> std::result::Result<Payload, ChatQuotaError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ChatQuotaError::CacheDecode {
        key: key.to_string(),
        message: format!("invalid JSON: {}", e),
    })?;

    let is_envelope = value
        .as_object()
        .map(|o| o.contains_key("schema") && o.contains_key("version") && o.contains_key("data"))
        .unwrap_or(false);
    if !is_envelope {
        return Ok(Payload::Legacy(value));
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| ChatQuotaError::CacheDecode {
            key: key.to_string(),
            message: format!("malformed envelope: {}", e),
        })?;

    if envelope.schema != schema {
        return Err(ChatQuotaError::CacheDecode {
            key: key.to_string(),
            message: format!("expected schema '{}', found '{}'", schema, envelope.schema),
        });
    }
    if envelope.version > CURRENT_VERSION {
        return Err(ChatQuotaError::CacheDecode {
            key: key.to_string(),
            message: format!(
                "version {} is newer than supported version {}",
                envelope.version, CURRENT_VERSION
            ),
        });
    }

    Ok(Payload::Current(envelope.data))
}

/// Returns true if `raw` is an envelope written by a newer version
///
/// Such blobs read as empty, and must not be overwritten by this build.
pub fn written_by_newer_version(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("version").and_then(Value::as_u64))
        .map(|v| v > u64::from(CURRENT_VERSION))
        .unwrap_or(false)
}

/// Encodes a timestamp the way every persisted blob stores it
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Revives a timestamp from its persisted form
///
/// Accepts RFC 3339 strings, and integer milliseconds since the Unix epoch as
/// found in some legacy blobs.
pub fn revive_timestamp(field: &str, value: &Value) -> std::result::Result<DateTime<Utc>, String> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("field '{}': invalid timestamp '{}': {}", field, s, e)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| format!("field '{}': invalid epoch millis {}", field, n)),
        Value::Null => Err(format!("field '{}' is missing", field)),
        other => Err(format!(
            "field '{}': expected timestamp, found {}",
            field, other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seal_then_open_returns_current_payload() {
        let raw = seal("quota_state", json!({"count": 3})).unwrap();
        let payload = open("quota:u1", "quota_state", &raw).unwrap();
        assert_eq!(payload, Payload::Current(json!({"count": 3})));
    }

    #[test]
    fn test_open_bare_value_is_legacy() {
        let payload = open("k", "conversation_index", r#"[{"id":"a"}]"#).unwrap();
        assert_eq!(payload, Payload::Legacy(json!([{"id": "a"}])));
    }

    #[test]
    fn test_open_rejects_schema_mismatch() {
        let raw = seal("quota_state", json!({})).unwrap();
        let err = open("k", "conversation_index", &raw).unwrap_err();
        assert!(matches!(err, ChatQuotaError::CacheDecode { .. }));
        assert!(err.to_string().contains("expected schema"));
    }

    #[test]
    fn test_open_rejects_newer_version() {
        let raw = json!({"schema": "quota_state", "version": 99, "data": {}}).to_string();
        let err = open("k", "quota_state", &raw).unwrap_err();
        assert!(err.to_string().contains("newer"));
    }

    #[test]
    fn test_written_by_newer_version() {
        let newer = json!({"schema": "x", "version": 2, "data": []}).to_string();
        assert!(written_by_newer_version(&newer));
        assert!(!written_by_newer_version(&seal("x", json!([])).unwrap()));
        assert!(!written_by_newer_version("[1, 2]"));
        assert!(!written_by_newer_version("{broken"));
    }

    #[test]
    fn test_open_rejects_invalid_json() {
        let err = open("k", "quota_state", "{not json").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_revive_timestamp_from_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 8, 15, 0).unwrap();
        let encoded = encode_timestamp(&ts);
        assert_eq!(encoded, "2024-02-29T08:15:00Z");
        assert_eq!(revive_timestamp("t", &json!(encoded)).unwrap(), ts);
    }

    #[test]
    fn test_revive_timestamp_preserves_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let revived = revive_timestamp("t", &json!(encode_timestamp(&ts))).unwrap();
        assert_eq!(revived, ts);
    }

    #[test]
    fn test_revive_timestamp_from_js_date_string() {
        let revived = revive_timestamp("t", &json!("2024-01-31T10:00:00.000Z")).unwrap();
        assert_eq!(revived, Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_revive_timestamp_from_epoch_millis() {
        let revived = revive_timestamp("t", &json!(1_706_695_200_000_i64)).unwrap();
        assert_eq!(revived, Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_revive_timestamp_rejects_garbage() {
        assert!(revive_timestamp("t", &json!("yesterday")).is_err());
        assert!(revive_timestamp("t", &Value::Null).is_err());
        assert!(revive_timestamp("t", &json!(true)).is_err());
    }
}
