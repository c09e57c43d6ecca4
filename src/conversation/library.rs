//! In-memory conversation collection with a guarded write policy
//!
//! The library batches edits in memory and writes them out on
//! [`ConversationLibrary::persist`]. An empty collection is never persisted:
//! a library that has not finished loading must not replace a populated
//! cache with nothing. Deleting a conversation is the one explicit action
//! allowed to shrink the cache, and it writes through immediately.

use crate::clock::Clock;
use crate::conversation::cache::ConversationCache;
use crate::conversation::types::{
    sort_recent_first, ChatMessage, ConversationIndexEntry, ConversationRecord,
};
use crate::error::{ChatQuotaError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Working set of conversations for one client
pub struct ConversationLibrary {
    cache: ConversationCache,
    clock: Arc<dyn Clock>,
    records: BTreeMap<String, ConversationRecord>,
    loaded: bool,
    dirty: bool,
}

impl ConversationLibrary {
    /// Creates an empty, not yet loaded library
    pub fn new(cache: ConversationCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            clock,
            records: BTreeMap::new(),
            loaded: false,
            dirty: false,
        }
    }

    /// Loads the persisted conversations, keeping any unsaved local edits
    pub fn load(&mut self) {
        let mut persisted = self.cache.load_all_records();
        for (id, record) in std::mem::take(&mut self.records) {
            persisted.insert(id, record);
        }
        self.records = persisted;
        self.loaded = true;
        tracing::debug!(conversations = self.records.len(), "Loaded conversation library");
    }

    /// Whether [`load`](Self::load) has run
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether there are edits not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of conversations in memory
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no conversations are in memory
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summaries, most recently accessed first
    pub fn list(&self) -> Vec<ConversationIndexEntry> {
        let mut entries: Vec<ConversationIndexEntry> = self
            .records
            .values()
            .map(ConversationRecord::index_entry)
            .collect();
        sort_recent_first(&mut entries);
        entries
    }

    /// Looks up a conversation
    pub fn get(&self, id: &str) -> Option<&ConversationRecord> {
        self.records.get(id)
    }

    /// Looks up a conversation by id or unique id prefix
    pub fn resolve(&self, id_or_prefix: &str) -> Option<&ConversationRecord> {
        if let Some(record) = self.records.get(id_or_prefix) {
            return Some(record);
        }
        let mut matches = self
            .records
            .values()
            .filter(|r| r.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Some(record),
            _ => None,
        }
    }

    /// Starts a new conversation with `message` and returns its id
    pub fn start(&mut self, message: ChatMessage) -> String {
        let record = ConversationRecord::from_first_message(message, self.clock.now());
        let id = record.id.clone();
        tracing::debug!(id = %id, title = %record.title, "Started conversation");
        self.records.insert(id.clone(), record);
        self.dirty = true;
        id
    }

    /// Appends `message` to conversation `id`
    ///
    /// # Errors
    ///
    /// Returns [`ChatQuotaError::ConversationNotFound`] for an unknown id.
    pub fn append(&mut self, id: &str, message: ChatMessage) -> Result<()> {
        let now = self.clock.now();
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ChatQuotaError::ConversationNotFound(id.to_string()))?;
        record.push(message, now);
        self.dirty = true;
        Ok(())
    }

    /// Marks conversation `id` as opened now
    pub fn touch(&mut self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ChatQuotaError::ConversationNotFound(id.to_string()))?;
        record.touch(now);
        self.dirty = true;
        Ok(())
    }

    /// Renames conversation `id`
    pub fn rename(&mut self, id: &str, title: impl Into<String>) -> Result<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ChatQuotaError::ConversationNotFound(id.to_string()))?;
        record.title = title.into();
        self.dirty = true;
        Ok(())
    }

    /// Deletes conversation `id` from memory and from the cache
    ///
    /// Returns false if no such conversation existed.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let in_memory = self.records.remove(id).is_some();
        let persisted = self.cache.delete_conversation(id)?;
        Ok(in_memory || persisted)
    }

    /// Writes pending edits to the cache
    ///
    /// Skips the write when nothing changed or the collection is empty.
    /// Returns true if a write happened.
    pub fn persist(&mut self) -> Result<bool> {
        if self.records.is_empty() {
            tracing::debug!("Skipping persist of empty conversation library");
            return Ok(false);
        }
        if !self.dirty {
            return Ok(false);
        }
        if !self.loaded {
            // Merge with what is on disk before writing the whole map
            self.load();
        }

        self.cache.save_all(&self.records)?;
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_library() -> (ConversationLibrary, ConversationCache, Arc<ManualClock>) {
        let cache = ConversationCache::new(Arc::new(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let library = ConversationLibrary::new(cache.clone(), clock.clone());
        (library, cache, clock)
    }

    #[test]
    fn test_persist_skips_empty_library() {
        let (mut library, cache, _) = create_test_library();
        let mut seeded =
            ConversationLibrary::new(cache.clone(), Arc::new(crate::clock::SystemClock));
        seeded.start(ChatMessage::user("keep me"));
        assert!(seeded.persist().unwrap());

        library.dirty = true;
        assert!(!library.persist().unwrap());
        assert_eq!(cache.load_all_records().len(), 1);
    }

    #[test]
    fn test_persist_skips_when_clean() {
        let (mut library, _, _) = create_test_library();
        library.start(ChatMessage::user("hello"));
        assert!(library.persist().unwrap());
        assert!(!library.persist().unwrap());
        assert!(!library.is_dirty());
    }

    #[test]
    fn test_persist_before_load_merges_with_cache() {
        let (mut first, cache, clock) = create_test_library();
        first.load();
        let existing = first.start(ChatMessage::user("older conversation"));
        first.persist().unwrap();

        let mut second = ConversationLibrary::new(cache.clone(), clock);
        let fresh = second.start(ChatMessage::user("new conversation"));
        assert!(second.persist().unwrap());

        let records = cache.load_all_records();
        assert!(records.contains_key(&existing));
        assert!(records.contains_key(&fresh));
    }

    #[test]
    fn test_load_keeps_unsaved_edits() {
        let (mut library, cache, clock) = create_test_library();
        let mut other = ConversationLibrary::new(cache, clock);
        other.start(ChatMessage::user("persisted"));
        other.persist().unwrap();

        let local = library.start(ChatMessage::user("local"));
        library.load();
        assert_eq!(library.len(), 2);
        assert!(library.get(&local).is_some());
    }

    #[test]
    fn test_append_and_list_order() {
        let (mut library, _, clock) = create_test_library();
        library.load();
        let a = library.start(ChatMessage::user("first"));
        clock.advance(Duration::minutes(1));
        let b = library.start(ChatMessage::user("second"));
        clock.advance(Duration::minutes(1));
        library.append(&a, ChatMessage::assistant("reply")).unwrap();

        let list = library.list();
        assert_eq!(list[0].id, a);
        assert_eq!(list[1].id, b);
        assert_eq!(library.get(&a).unwrap().messages.len(), 2);
    }

    #[test]
    fn test_append_unknown_conversation() {
        let (mut library, _, _) = create_test_library();
        let err = library
            .append("missing", ChatMessage::user("x"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatQuotaError>(),
            Some(ChatQuotaError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn test_remove_last_conversation_writes_through() {
        let (mut library, cache, _) = create_test_library();
        library.load();
        let id = library.start(ChatMessage::user("only one"));
        library.persist().unwrap();

        assert!(library.remove(&id).unwrap());
        assert!(library.is_empty());
        assert!(cache.load_all_records().is_empty());
        assert!(!library.remove(&id).unwrap());
    }

    #[test]
    fn test_resolve_by_prefix() {
        let (mut library, _, _) = create_test_library();
        let id = library.start(ChatMessage::user("x"));
        assert_eq!(library.resolve(&id[..8]).unwrap().id, id);
        assert!(library.resolve("zzzzzzzz-not-there").is_none());
    }

    #[test]
    fn test_rename_and_touch() {
        let (mut library, _, clock) = create_test_library();
        let id = library.start(ChatMessage::user("x"));
        library.rename(&id, "Ruth").unwrap();
        clock.advance(Duration::hours(2));
        library.touch(&id).unwrap();

        let record = library.get(&id).unwrap();
        assert_eq!(record.title, "Ruth");
        assert_eq!(record.last_accessed, clock.now());
    }
}
