//! Chat session and message persistence
//!
//! The store owns two documents: the session (owner, title, timestamps) and
//! its appended messages. Ownership is enforced here on every read and
//! append; callers receive `Forbidden` rather than another user's transcript.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use voice_gateway_core::{ChatSession, Message, MessageRole, NewMessage, SourceType};

use crate::client::ScyllaClient;
use crate::error::StoreError;

/// Chat session store
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a session document with `created_at == last_updated == now`
    async fn create_session(&self, user_id: &str, title: &str)
        -> Result<ChatSession, StoreError>;

    /// Append a message and advance the session's `last_updated`
    ///
    /// The message carries a server-assigned id and timestamp chosen before
    /// the call; appending the same message twice writes one document, which
    /// makes retries after cancellation safe. The message write is primary;
    /// the `last_updated` bump is best-effort.
    async fn append_message(
        &self,
        chat_id: &str,
        requesting_user: &str,
        message: &NewMessage,
    ) -> Result<(), StoreError>;

    /// Load a session, enforcing ownership
    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<ChatSession, StoreError>;

    /// Sessions owned by `user_id`, most recently updated first
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError>;

    /// Messages of a session ordered by timestamp ascending, enforcing
    /// ownership
    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<Vec<Message>, StoreError>;
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn parse_role(value: &str) -> Result<MessageRole, StoreError> {
    match value {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        other => Err(StoreError::InvalidData(format!("unknown role: {other}"))),
    }
}

fn source_str(source: SourceType) -> &'static str {
    match source {
        SourceType::Text => "text",
        SourceType::Voice => "voice",
    }
}

fn parse_source(value: &str) -> Result<SourceType, StoreError> {
    match value {
        "text" => Ok(SourceType::Text),
        "voice" => Ok(SourceType::Voice),
        other => Err(StoreError::InvalidData(format!(
            "unknown source type: {other}"
        ))),
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// ScyllaDB implementation of the chat store
#[derive(Clone)]
pub struct ScyllaChatStore {
    client: ScyllaClient,
}

impl ScyllaChatStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    async fn load_owned(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<ChatSession, StoreError> {
        let query = format!(
            "SELECT chat_id, user_id, title, created_at, last_updated \
             FROM {}.chat_sessions WHERE chat_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (chat_id,))
            .await?;

        let row = result
            .rows
            .and_then(|rows| rows.into_iter().next())
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))?;

        let (chat_id, user_id, title, created_at, last_updated): (
            String,
            String,
            String,
            i64,
            i64,
        ) = row
            .into_typed()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;

        if user_id != requesting_user {
            return Err(StoreError::Forbidden(chat_id));
        }

        Ok(ChatSession {
            chat_id,
            user_id,
            title,
            created_at: millis_to_datetime(created_at),
            last_updated: millis_to_datetime(last_updated),
        })
    }
}

#[async_trait]
impl ChatStore for ScyllaChatStore {
    async fn create_session(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<ChatSession, StoreError> {
        let session = ChatSession::new(user_id, title);

        let query = format!(
            "INSERT INTO {}.chat_sessions \
             (chat_id, user_id, title, created_at, last_updated) \
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &session.chat_id,
                    &session.user_id,
                    &session.title,
                    session.created_at.timestamp_millis(),
                    session.last_updated.timestamp_millis(),
                ),
            )
            .await?;

        tracing::debug!(chat_id = %session.chat_id, user_id = %user_id, "Session created");
        Ok(session)
    }

    async fn append_message(
        &self,
        chat_id: &str,
        requesting_user: &str,
        message: &NewMessage,
    ) -> Result<(), StoreError> {
        self.load_owned(chat_id, requesting_user).await?;

        let query = format!(
            "INSERT INTO {}.chat_messages \
             (chat_id, created_ms, message_id, role, content, source_type) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    chat_id,
                    message.timestamp.timestamp_millis(),
                    &message.message_id,
                    role_str(message.role),
                    &message.text,
                    source_str(message.source_type),
                ),
            )
            .await?;

        tracing::debug!(
            chat_id = %chat_id,
            message_id = %message.message_id,
            role = role_str(message.role),
            "Message appended"
        );

        // The message write above is the durable record; a missed bump here
        // is reconciled the next time the session is touched.
        let bump = format!(
            "UPDATE {}.chat_sessions SET last_updated = ? WHERE chat_id = ?",
            self.client.keyspace()
        );
        if let Err(e) = self
            .client
            .session()
            .query_unpaged(bump, (message.timestamp.timestamp_millis(), chat_id))
            .await
        {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to advance last_updated");
        }

        Ok(())
    }

    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<ChatSession, StoreError> {
        self.load_owned(chat_id, requesting_user).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        // Sessions are keyed by chat_id; the per-user listing filters and
        // sorts client-side. A sessions_by_user view would replace this at
        // scale.
        let query = format!(
            "SELECT chat_id, user_id, title, created_at, last_updated \
             FROM {}.chat_sessions WHERE user_id = ? ALLOW FILTERING",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await?;

        let mut sessions = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (chat_id, user_id, title, created_at, last_updated): (
                    String,
                    String,
                    String,
                    i64,
                    i64,
                ) = row
                    .into_typed()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;

                sessions.push(ChatSession {
                    chat_id,
                    user_id,
                    title,
                    created_at: millis_to_datetime(created_at),
                    last_updated: millis_to_datetime(last_updated),
                });
            }
        }

        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(sessions)
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<Vec<Message>, StoreError> {
        self.load_owned(chat_id, requesting_user).await?;

        let query = format!(
            "SELECT message_id, created_ms, role, content, source_type \
             FROM {}.chat_messages WHERE chat_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (chat_id,))
            .await?;

        let mut messages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (message_id, created_ms, role, content, source_type): (
                    String,
                    i64,
                    String,
                    String,
                    String,
                ) = row
                    .into_typed()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;

                messages.push(Message {
                    message_id,
                    role: parse_role(&role)?,
                    text: content,
                    timestamp: millis_to_datetime(created_ms),
                    source_type: parse_source(&source_type)?,
                });
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(parse_role(role_str(MessageRole::User)).unwrap(), MessageRole::User);
        assert_eq!(
            parse_role(role_str(MessageRole::Assistant)).unwrap(),
            MessageRole::Assistant
        );
        assert!(parse_role("admin").is_err());
    }

    #[test]
    fn test_source_round_trip() {
        assert_eq!(parse_source(source_str(SourceType::Voice)).unwrap(), SourceType::Voice);
        assert!(parse_source("camera").is_err());
    }
}
