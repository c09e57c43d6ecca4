use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest title derived from a first message, in characters
const MAX_TITLE_CHARS: usize = 40;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sent by the user
    User,
    /// Reply from the assistant
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parses a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Creates a user message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatquota::conversation::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("What does Psalm 23 say?");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A cached conversation with its full message list
///
/// Messages are kept in the order they were appended, which is chronological
/// order. The id never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Stable unique id
    pub id: String,
    /// Display title
    pub title: String,
    /// Messages, oldest first
    pub messages: Vec<ChatMessage>,
    /// Last time the conversation was opened or extended
    pub last_accessed: DateTime<Utc>,
}

impl ConversationRecord {
    /// Starts a conversation with a fresh id
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            last_accessed: now,
        }
    }

    /// Starts a conversation titled after its first message
    pub fn from_first_message(message: ChatMessage, now: DateTime<Utc>) -> Self {
        let mut record = Self::new(title_from_message(&message.content), now);
        record.messages.push(message);
        record
    }

    /// Appends a message and marks the conversation as accessed at `now`
    pub fn push(&mut self, message: ChatMessage, now: DateTime<Utc>) {
        self.messages.push(message);
        self.touch(now);
    }

    /// Marks the conversation as accessed at `now`
    ///
    /// Access time never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }

    /// Lightweight summary for listings
    pub fn index_entry(&self) -> ConversationIndexEntry {
        ConversationIndexEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            last_accessed: self.last_accessed,
        }
    }
}

/// Summary of a conversation, listed without loading its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationIndexEntry {
    /// Id of the summarized conversation
    pub id: String,
    /// Display title
    pub title: String,
    /// Last time the conversation was opened or extended
    pub last_accessed: DateTime<Utc>,
}

/// Derives a conversation title from the first message text
///
/// Uses the first non-empty line, shortened to 40 characters with an
/// ellipsis when needed.
pub fn title_from_message(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("New conversation");

    if line.chars().count() > MAX_TITLE_CHARS {
        let short: String = line.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{}...", short.trim_end())
    } else {
        line.to_string()
    }
}

/// Orders summaries most recently accessed first, ties broken by id
pub fn sort_recent_first(entries: &mut [ConversationIndexEntry]) {
    entries.sort_by(|a, b| {
        b.last_accessed
            .cmp(&a.last_accessed)
            .then_with(|| a.id.cmp(&b.id))
    });
}
