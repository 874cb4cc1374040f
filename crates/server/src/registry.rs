//! Connection registry
//!
//! Tracks open connections keyed by user id for out-of-band delivery. Entries
//! are added on accept, re-keyed when a connection authenticates
//! mid-stream, and removed on close. Delivery goes through each connection's
//! outbox, so registry sends never interleave with turn replies mid-frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::frames::ServerFrame;
use crate::outbox::Outbox;

struct Entry {
    connection_id: u64,
    outbox: Outbox,
}

/// Registry of open connections keyed by user id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning its registry id
    pub fn register(&self, user_id: &str, outbox: Outbox) -> u64 {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(Entry {
                connection_id,
                outbox,
            });
        tracing::debug!(user_id = %user_id, connection_id, "Connection registered");
        connection_id
    }

    /// Remove a connection
    pub fn deregister(&self, user_id: &str, connection_id: u64) {
        let mut connections = self.connections.write();
        if let Some(entries) = connections.get_mut(user_id) {
            entries.retain(|e| e.connection_id != connection_id);
            if entries.is_empty() {
                connections.remove(user_id);
            }
        }
        tracing::debug!(user_id = %user_id, connection_id, "Connection deregistered");
    }

    /// Move a connection under a new user id after authentication
    pub fn rekey(&self, old_user: &str, new_user: &str, connection_id: u64) {
        if old_user == new_user {
            return;
        }

        let mut connections = self.connections.write();
        let entry = connections.get_mut(old_user).and_then(|entries| {
            let index = entries
                .iter()
                .position(|e| e.connection_id == connection_id)?;
            Some(entries.remove(index))
        });

        if let Some(entry) = entry {
            if connections
                .get(old_user)
                .is_some_and(|entries| entries.is_empty())
            {
                connections.remove(old_user);
            }
            connections
                .entry(new_user.to_string())
                .or_default()
                .push(entry);
        }
    }

    /// Deliver a frame to every open connection of `user_id`
    ///
    /// Returns how many connections it was queued for.
    pub fn send_to_user(&self, user_id: &str, frame: ServerFrame) -> usize {
        let connections = self.connections.read();
        match connections.get(user_id) {
            Some(entries) => {
                for entry in entries {
                    entry.outbox.send(frame.clone());
                }
                entries.len()
            }
            None => 0,
        }
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.read().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::Outgoing;

    #[tokio::test]
    async fn test_register_and_send() {
        let registry = ConnectionRegistry::new();
        let (outbox, mut rx, _overflow) = Outbox::channel(8);

        let id = registry.register("alice", outbox);
        assert_eq!(registry.connection_count(), 1);

        let delivered = registry.send_to_user("alice", ServerFrame::error("ping"));
        assert_eq!(delivered, 1);
        assert!(matches!(
            rx.recv().await.unwrap(),
            Outgoing::Frame(ServerFrame::Error { .. })
        ));

        assert_eq!(registry.send_to_user("bob", ServerFrame::error("ping")), 0);

        registry.deregister("alice", id);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_rekey_moves_connection() {
        let registry = ConnectionRegistry::new();
        let (outbox, mut rx, _overflow) = Outbox::channel(8);

        let id = registry.register("anonymous", outbox);
        registry.rekey("anonymous", "alice", id);

        assert_eq!(registry.send_to_user("anonymous", ServerFrame::error("x")), 0);
        assert_eq!(registry.send_to_user("alice", ServerFrame::error("y")), 1);
        assert!(rx.recv().await.is_some());
    }
}
