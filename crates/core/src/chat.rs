//! Chat session and message documents

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat session
///
/// Invariants: `user_id` never changes; `last_updated >= created_at`;
/// `last_updated` advances on every appended message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Server-assigned opaque id, globally unique
    pub chat_id: String,
    /// Owner
    pub user_id: String,
    /// Short display string
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new session document with a server-assigned id
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            created_at: now,
            last_updated: now,
        }
    }
}

/// Author of a persisted message
///
/// Human-originated messages always persist as `User`, regardless of the
/// identity's admin role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// How the utterance entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Voice,
}

/// A persisted message within a session, ordered by `timestamp` ascending
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id
    pub message_id: String,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: SourceType,
}

/// A message about to be appended
///
/// The id and timestamp are assigned before the store is called, so a retry
/// after cancellation writes the same document and the append stays
/// idempotent.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: SourceType,
}

impl NewMessage {
    fn new(role: MessageRole, text: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            source_type,
        }
    }

    /// A human-originated message
    pub fn user(text: impl Into<String>, source_type: SourceType) -> Self {
        Self::new(MessageRole::User, text, source_type)
    }

    /// An assistant reply
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text, SourceType::Text)
    }

    /// Force this message to sort after `earlier` within the same session
    ///
    /// Timestamps are millisecond-precision in storage; a reply created in the
    /// same millisecond as the utterance it answers would otherwise tie.
    pub fn ordered_after(mut self, earlier: &NewMessage) -> Self {
        if self.timestamp <= earlier.timestamp {
            self.timestamp = earlier.timestamp + Duration::milliseconds(1);
        }
        self
    }

    /// The persisted form of this message
    pub fn into_message(self) -> Message {
        Message {
            message_id: self.message_id,
            role: self.role,
            text: self.text,
            timestamp: self.timestamp,
            source_type: self.source_type,
        }
    }
}
