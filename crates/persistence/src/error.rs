//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store query error: {0}")]
    Query(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {0} is not owned by the caller")]
    Forbidden(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema creation failed: {0}")]
    Schema(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Is this a backend-availability problem rather than a caller mistake?
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Query(_))
    }
}

impl From<scylla::transport::errors::NewSessionError> for StoreError {
    fn from(e: scylla::transport::errors::NewSessionError) -> Self {
        StoreError::Connection(e.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for StoreError {
    fn from(e: scylla::transport::errors::QueryError) -> Self {
        StoreError::Query(e.to_string())
    }
}
