//! Document-store persistence layer
//!
//! Provides the chat session store: session documents in `chat_sessions` and
//! their appended messages in `chat_messages`. Backed by ScyllaDB in
//! production; an in-memory store with the same semantics backs the tests.

pub mod chats;
pub mod client;
pub mod error;
pub mod memory;
pub mod schema;

pub use chats::{ChatStore, ScyllaChatStore};
pub use client::ScyllaClient;
pub use error::StoreError;
pub use memory::MemoryChatStore;

use voice_gateway_config::StoreServiceConfig;

/// Connect to the document store and ensure the schema exists
pub async fn init(config: StoreServiceConfig) -> Result<ScyllaChatStore, StoreError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok(ScyllaChatStore::new(client))
}
