//! Persistent conversation cache
//!
//! Conversations live in local storage as two blobs: the index used for
//! listings and the record map holding every message. The record map is
//! authoritative. The index is advisory: whenever its ids disagree with the
//! records it is rebuilt from them, never the other way round.
//!
//! Nothing here expires on its own. Conversations leave the cache only
//! through [`ConversationCache::delete_conversation`] or
//! [`ConversationCache::clear`].

use crate::conversation::codec::{self, Decoded, INDEX_SCHEMA, RECORDS_SCHEMA};
use crate::conversation::types::{sort_recent_first, ConversationIndexEntry, ConversationRecord};
use crate::error::{ChatQuotaError, Result};
use crate::storage::envelope;
use crate::storage::KeyValueStore;
use crate::telemetry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Storage key of the index blob
pub const INDEX_KEY: &str = "conversation_history";

/// Storage key of the record map blob
pub const RECORDS_KEY: &str = "conversations";

/// Conversation cache over a key-value store
#[derive(Clone)]
pub struct ConversationCache {
    storage: Arc<dyn KeyValueStore>,
}

impl ConversationCache {
    /// Creates a cache over `storage`
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Persists the index as given
    pub fn save_index(&self, entries: &[ConversationIndexEntry]) -> Result<()> {
        self.write(INDEX_KEY, &codec::encode_index(entries)?)
    }

    /// Loads the index, rebuilt from the records if the two disagree
    ///
    /// A rebuilt index is written back so the next listing reads it as is.
    /// Never fails: unreadable data is logged and skipped.
    pub fn load_index(&self) -> Vec<ConversationIndexEntry> {
        let index = self.load_stored_index();
        let records = self.load_all_records();

        let index_ids: BTreeSet<&str> = index.iter().map(|e| e.id.as_str()).collect();
        let record_ids: BTreeSet<&str> = records.keys().map(String::as_str).collect();
        if index_ids == record_ids && index_ids.len() == index.len() {
            return index;
        }

        tracing::info!(
            index_entries = index.len(),
            records = records.len(),
            "Conversation index disagrees with records, rebuilding"
        );
        let rebuilt = rebuild_index(&records);
        if let Err(e) = self.save_index(&rebuilt) {
            tracing::warn!(error = %e, "Failed to save rebuilt conversation index");
        }
        rebuilt
    }

    /// Loads the index exactly as persisted, without checking it against the records
    pub fn load_stored_index(&self) -> Vec<ConversationIndexEntry> {
        match self.read(INDEX_KEY) {
            Some(raw) => report(INDEX_SCHEMA, codec::decode_index(INDEX_KEY, &raw)),
            None => Vec::new(),
        }
    }

    /// Loads every cached conversation, keyed by id
    ///
    /// Never fails: unreadable records are logged and skipped.
    pub fn load_all_records(&self) -> BTreeMap<String, ConversationRecord> {
        match self.read(RECORDS_KEY) {
            Some(raw) => report(RECORDS_SCHEMA, codec::decode_records(RECORDS_KEY, &raw)),
            None => BTreeMap::new(),
        }
    }

    /// Loads one conversation
    pub fn load_record(&self, id: &str) -> Option<ConversationRecord> {
        self.load_all_records().remove(id)
    }

    /// Inserts or replaces one conversation and its index entry
    pub fn save_record(&self, record: &ConversationRecord) -> Result<()> {
        let mut records = self.load_all_records();
        records.insert(record.id.clone(), record.clone());
        self.save_all(&records)
    }

    /// Replaces the whole cache with `records`
    ///
    /// Writes the records first, then an index derived from them. If the
    /// second write is lost, [`load_index`](Self::load_index) repairs it.
    pub fn save_all(&self, records: &BTreeMap<String, ConversationRecord>) -> Result<()> {
        self.write(RECORDS_KEY, &codec::encode_records(records)?)?;
        self.save_index(&rebuild_index(records))
    }

    /// Removes a conversation; returns false if it was not cached
    pub fn delete_conversation(&self, id: &str) -> Result<bool> {
        let mut records = self.load_all_records();
        let existed = records.remove(id).is_some();
        if existed {
            self.save_all(&records)?;
            tracing::info!(id, "Deleted conversation");
        } else {
            // Drop a dangling index entry, if any
            let mut index = self.load_stored_index();
            let before = index.len();
            index.retain(|e| e.id != id);
            if index.len() != before {
                self.save_index(&index)?;
            }
        }
        Ok(existed)
    }

    /// Removes every cached conversation
    pub fn clear(&self) -> Result<()> {
        self.storage.remove(RECORDS_KEY)?;
        self.storage.remove(INDEX_KEY)?;
        tracing::info!("Cleared conversation cache");
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read conversation cache");
                None
            }
        }
    }

    fn write(&self, key: &str, raw: &str) -> Result<()> {
        if let Some(existing) = self.storage.get(key)? {
            if envelope::written_by_newer_version(&existing) {
                return Err(ChatQuotaError::Storage(format!(
                    "refusing to overwrite '{}' written by a newer version",
                    key
                ))
                .into());
            }
        }
        self.storage.set(key, raw)
    }
}

fn report<T>(schema: &str, decoded: Decoded<T>) -> T {
    for err in &decoded.errors {
        tracing::warn!(error = %err, "Discarding corrupted cache entry");
        telemetry::record_cache_decode_error(schema);
    }
    decoded.value
}

fn rebuild_index(records: &BTreeMap<String, ConversationRecord>) -> Vec<ConversationIndexEntry> {
    let mut index: Vec<ConversationIndexEntry> =
        records.values().map(ConversationRecord::index_entry).collect();
    sort_recent_first(&mut index);
    index
}
