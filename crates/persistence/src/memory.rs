//! In-memory chat store
//!
//! Backs tests and adapter-less development. Behaves like the ScyllaDB store,
//! including ownership enforcement and idempotent appends, and can be told to
//! fail writes so failure paths are reachable from tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use voice_gateway_core::{ChatSession, Message, NewMessage};

use crate::chats::ChatStore;
use crate::error::StoreError;

struct StoredSession {
    session: ChatSession,
    // Keyed by message id so a retried append overwrites instead of
    // duplicating.
    messages: HashMap<String, Message>,
}

/// In-memory implementation of the chat store
#[derive(Default)]
pub struct MemoryChatStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    fail_writes: AtomicBool,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a query error until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("store offline".to_string()));
        }
        Ok(())
    }

    fn owned_session(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<ChatSession, StoreError> {
        let sessions = self.sessions.read();
        let stored = sessions
            .get(chat_id)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))?;

        if stored.session.user_id != requesting_user {
            return Err(StoreError::Forbidden(chat_id.to_string()));
        }
        Ok(stored.session.clone())
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_session(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<ChatSession, StoreError> {
        self.check_writable()?;

        let session = ChatSession::new(user_id, title);
        self.sessions.write().insert(
            session.chat_id.clone(),
            StoredSession {
                session: session.clone(),
                messages: HashMap::new(),
            },
        );
        Ok(session)
    }

    async fn append_message(
        &self,
        chat_id: &str,
        requesting_user: &str,
        message: &NewMessage,
    ) -> Result<(), StoreError> {
        self.owned_session(chat_id, requesting_user)?;
        self.check_writable()?;

        let mut sessions = self.sessions.write();
        let stored = sessions
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))?;

        stored
            .messages
            .insert(message.message_id.clone(), message.clone().into_message());

        if message.timestamp > stored.session.last_updated {
            stored.session.last_updated = message.timestamp;
        }
        Ok(())
    }

    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<ChatSession, StoreError> {
        self.owned_session(chat_id, requesting_user)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let sessions = self.sessions.read();
        let mut owned: Vec<ChatSession> = sessions
            .values()
            .map(|s| s.session.clone())
            .filter(|s| s.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(owned)
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user: &str,
    ) -> Result<Vec<Message>, StoreError> {
        self.owned_session(chat_id, requesting_user)?;

        let sessions = self.sessions.read();
        let stored = sessions
            .get(chat_id)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))?;

        let mut messages: Vec<Message> = stored.messages.values().cloned().collect();
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        Ok(messages)
    }
}
