//! ScyllaDB client and connection management

use scylla::{Session, SessionBuilder};
use std::sync::Arc;

use voice_gateway_config::StoreServiceConfig;

use crate::error::StoreError;
use crate::schema;

/// ScyllaDB client wrapper
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: StoreServiceConfig,
}

impl ScyllaClient {
    /// Connect to the cluster
    pub async fn connect(config: StoreServiceConfig) -> Result<Self, StoreError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to document store");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Ensure keyspace and tables exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        schema::create_keyspace(
            &self.session,
            &self.config.keyspace,
            self.config.replication_factor,
        )
        .await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "Schema ensured");
        Ok(())
    }

    /// Get the underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get keyspace name
    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }
}
