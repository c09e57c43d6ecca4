//! One user's chat session
//!
//! Sending a message walks a fixed path: check the quota gate, ask the
//! completion collaborator for a reply, count the message, then record both
//! messages in the conversation library. A failed completion costs nothing
//! and leaves the conversation untouched.

use crate::completion::ChatCompletion;
use crate::conversation::{ChatMessage, ConversationLibrary};
use crate::error::{ChatQuotaError, Result};
use crate::quota::{QuotaState, QuotaStore};
use crate::telemetry;
use std::sync::Arc;

/// Result of a successful [`ChatSession::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Conversation the exchange was added to
    pub conversation_id: String,
    /// Assistant reply text
    pub reply: String,
    /// Quota state after the message was counted
    pub quota: QuotaState,
}

/// Chat session tying the quota gate to the conversation library
pub struct ChatSession {
    quota: QuotaStore,
    library: ConversationLibrary,
    completion: Arc<dyn ChatCompletion>,
}

impl ChatSession {
    /// Creates a session, loading the library if it is not loaded yet
    pub fn new(
        quota: QuotaStore,
        mut library: ConversationLibrary,
        completion: Arc<dyn ChatCompletion>,
    ) -> Self {
        if !library.is_loaded() {
            library.load();
        }
        Self {
            quota,
            library,
            completion,
        }
    }

    pub fn quota(&self) -> &QuotaStore {
        &self.quota
    }

    pub fn library(&self) -> &ConversationLibrary {
        &self.library
    }

    /// Sends `content`, continuing `conversation_id` or starting a new conversation
    ///
    /// `conversation_id` may be a unique id prefix.
    ///
    /// # Errors
    ///
    /// - [`ChatQuotaError::QuotaExceeded`] before any network call when the
    ///   allowance is used up
    /// - [`ChatQuotaError::ConversationNotFound`] for an unknown conversation
    /// - [`ChatQuotaError::Completion`] if no reply was produced; nothing is
    ///   counted or stored in that case
    pub async fn send(&mut self, conversation_id: Option<&str>, content: &str) -> Result<SendOutcome> {
        if !self.quota.can_send() {
            let state = self.quota.snapshot();
            telemetry::record_quota_exceeded();
            tracing::info!(count = state.count, limit = state.limit, "Send blocked by quota");
            return Err(ChatQuotaError::QuotaExceeded {
                count: state.count,
                limit: state.limit,
            }
            .into());
        }

        let user_message = ChatMessage::user(content);
        let (existing_id, mut history) = match conversation_id {
            Some(id) => {
                let record = self
                    .library
                    .resolve(id)
                    .ok_or_else(|| ChatQuotaError::ConversationNotFound(id.to_string()))?;
                (Some(record.id.clone()), record.messages.clone())
            }
            None => (None, Vec::new()),
        };
        history.push(user_message.clone());

        let reply = self.completion.complete(&history).await?;
        let quota = self.quota.record_sent()?;

        let conversation_id = match existing_id {
            Some(id) => {
                self.library.append(&id, user_message)?;
                id
            }
            None => self.library.start(user_message),
        };
        self.library
            .append(&conversation_id, ChatMessage::assistant(reply.clone()))?;

        if let Err(e) = self.library.persist() {
            tracing::warn!(error = %e, conversation_id = %conversation_id, "Failed to persist conversation");
        }

        Ok(SendOutcome {
            conversation_id,
            reply,
            quota,
        })
    }
}
