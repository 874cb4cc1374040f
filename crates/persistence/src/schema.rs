//! Keyspace and table definitions

use scylla::Session;

use crate::error::StoreError;

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), StoreError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );
    session
        .query_unpaged(query, ())
        .await
        .map_err(|e| StoreError::Schema(e.to_string()))?;
    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), StoreError> {
    let sessions_table = format!(
        "CREATE TABLE IF NOT EXISTS {}.chat_sessions (
            chat_id text PRIMARY KEY,
            user_id text,
            title text,
            created_at bigint,
            last_updated bigint
        )",
        keyspace
    );

    // Messages cluster by (timestamp, message_id): reads come back in turn
    // order, and a retried append with the same server-assigned id lands on
    // the same row instead of duplicating it.
    let messages_table = format!(
        "CREATE TABLE IF NOT EXISTS {}.chat_messages (
            chat_id text,
            created_ms bigint,
            message_id text,
            role text,
            content text,
            source_type text,
            PRIMARY KEY ((chat_id), created_ms, message_id)
        ) WITH CLUSTERING ORDER BY (created_ms ASC, message_id ASC)",
        keyspace
    );

    for query in [sessions_table, messages_table] {
        session
            .query_unpaged(query, ())
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
    }
    Ok(())
}
