//! Encode/decode of persisted conversation blobs
//!
//! Two blobs are persisted:
//!
//! - the index, schema `conversation_index`: an array of
//!   `{"id", "title", "lastAccessed"}`
//! - the records, schema `conversation_records`: an object mapping id to
//!   `{"id", "title", "messages": [{"role", "content"}], "lastAccessed"}`
//!
//! Decoding is entry by entry. A corrupted entry is dropped and reported in
//! [`Decoded::errors`]; the remaining entries are still returned.

use crate::conversation::types::{ChatMessage, ConversationIndexEntry, ConversationRecord, Role};
use crate::error::{ChatQuotaError, Result};
use crate::storage::envelope::{self, Payload};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Schema tag of the index blob
pub const INDEX_SCHEMA: &str = "conversation_index";

/// Schema tag of the record map blob
pub const RECORDS_SCHEMA: &str = "conversation_records";

/// Result of decoding a blob: whatever survived, plus what was dropped
#[derive(Debug)]
pub struct Decoded<T> {
    /// Entries that decoded cleanly
    pub value: T,
    /// One error per dropped entry, or a single error for an unreadable blob
    pub errors: Vec<ChatQuotaError>,
}

impl<T: Default> Decoded<T> {
    fn unreadable(err: ChatQuotaError) -> Self {
        Self {
            value: T::default(),
            errors: vec![err],
        }
    }
}

/// Serializes the index
pub fn encode_index(entries: &[ConversationIndexEntry]) -> Result<String> {
    let data: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "title": e.title,
                "lastAccessed": envelope::encode_timestamp(&e.last_accessed),
            })
        })
        .collect();
    envelope::seal(INDEX_SCHEMA, Value::Array(data))
}

/// Serializes the record map
pub fn encode_records(records: &BTreeMap<String, ConversationRecord>) -> Result<String> {
    let data: Map<String, Value> = records
        .iter()
        .map(|(id, r)| (id.clone(), encode_record(r)))
        .collect();
    envelope::seal(RECORDS_SCHEMA, Value::Object(data))
}

fn encode_record(record: &ConversationRecord) -> Value {
    let messages: Vec<Value> = record
        .messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    json!({
        "id": record.id,
        "title": record.title,
        "messages": messages,
        "lastAccessed": envelope::encode_timestamp(&record.last_accessed),
    })
}

/// Decodes the index blob stored under `key`
pub fn decode_index(key: &str, raw: &str) -> Decoded<Vec<ConversationIndexEntry>> {
    let data = match envelope::open(key, INDEX_SCHEMA, raw) {
        Ok(Payload::Current(data)) | Ok(Payload::Legacy(data)) => data,
        Err(e) => return Decoded::unreadable(e),
    };
    let Value::Array(items) = data else {
        return Decoded::unreadable(ChatQuotaError::CacheDecode {
            key: key.to_string(),
            message: "index is not an array".to_string(),
        });
    };

    let mut decoded = Decoded {
        value: Vec::with_capacity(items.len()),
        errors: Vec::new(),
    };
    for (position, item) in items.iter().enumerate() {
        match decode_index_entry(item) {
            Ok(entry) => decoded.value.push(entry),
            Err(message) => decoded.errors.push(ChatQuotaError::CacheDecode {
                key: format!("{}[{}]", key, position),
                message,
            }),
        }
    }
    decoded
}

fn decode_index_entry(item: &Value) -> std::result::Result<ConversationIndexEntry, String> {
    Ok(ConversationIndexEntry {
        id: read_string(item, "id")?,
        title: read_string(item, "title").unwrap_or_default(),
        last_accessed: envelope::revive_timestamp(
            "lastAccessed",
            item.get("lastAccessed").unwrap_or(&Value::Null),
        )?,
    })
}

/// Decodes the record map blob stored under `key`
///
/// Legacy blobs may be either an id-keyed object or a bare array of records.
pub fn decode_records(key: &str, raw: &str) -> Decoded<BTreeMap<String, ConversationRecord>> {
    let data = match envelope::open(key, RECORDS_SCHEMA, raw) {
        Ok(Payload::Current(data)) | Ok(Payload::Legacy(data)) => data,
        Err(e) => return Decoded::unreadable(e),
    };

    let items: Vec<(Option<String>, Value)> = match data {
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        _ => {
            return Decoded::unreadable(ChatQuotaError::CacheDecode {
                key: key.to_string(),
                message: "records are neither an object nor an array".to_string(),
            })
        }
    };

    let mut decoded = Decoded {
        value: BTreeMap::new(),
        errors: Vec::new(),
    };
    for (position, (map_key, item)) in items.into_iter().enumerate() {
        let label = map_key.clone().unwrap_or_else(|| position.to_string());
        match decode_record(map_key.as_deref(), &item) {
            Ok(record) => {
                decoded.value.insert(record.id.clone(), record);
            }
            Err(message) => decoded.errors.push(ChatQuotaError::CacheDecode {
                key: format!("{}[{}]", key, label),
                message,
            }),
        }
    }
    decoded
}

fn decode_record(
    map_key: Option<&str>,
    item: &Value,
) -> std::result::Result<ConversationRecord, String> {
    let id = match (read_string(item, "id"), map_key) {
        (Ok(id), Some(k)) if id != k => {
            return Err(format!("id '{}' does not match its key '{}'", id, k))
        }
        (Ok(id), _) => id,
        (Err(_), Some(k)) => k.to_string(),
        (Err(e), None) => return Err(e),
    };

    let messages = match item.get("messages") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, m)| decode_message(m).map_err(|e| format!("message {}: {}", i, e)))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return Err("field 'messages' is not an array".to_string()),
    };

    Ok(ConversationRecord {
        id,
        title: read_string(item, "title").unwrap_or_default(),
        messages,
        last_accessed: envelope::revive_timestamp(
            "lastAccessed",
            item.get("lastAccessed").unwrap_or(&Value::Null),
        )?,
    })
}

fn decode_message(item: &Value) -> std::result::Result<ChatMessage, String> {
    let role = read_string(item, "role")?;
    let role = Role::parse(&role).ok_or_else(|| format!("unknown role '{}'", role))?;
    Ok(ChatMessage {
        role,
        content: read_string(item, "content")?,
    })
}

fn read_string(item: &Value, field: &str) -> std::result::Result<String, String> {
    item.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("field '{}' is missing or not a string", field))
}
