//! Token verification against the identity provider
//!
//! The gateway never mints or inspects tokens itself; it forwards the bearer
//! token to the provider's verification endpoint and trusts the answer. The
//! verifier is callable both during the upgrade request and mid-connection
//! when an `auth` control frame arrives.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use voice_gateway_config::AuthServiceConfig;
use voice_gateway_core::{Identity, Role};

/// Verification errors
///
/// A malformed, expired or signature-invalid token is not an error; it is the
/// `Invalid` outcome. Errors are reserved for the provider being unreachable.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("Identity provider returned a malformed response: {0}")]
    BadResponse(String),
}

/// Outcome of verifying a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(Identity),
    Invalid,
}

impl Verification {
    pub fn identity(self) -> Option<Identity> {
        match self {
            Verification::Valid(identity) => Some(identity),
            Verification::Invalid => None,
        }
    }
}

/// Token verifier
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Validate a bearer token, returning the caller's identity or `Invalid`
    async fn verify(&self, token: &str) -> Result<Verification, AuthError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "userId")]
    user_id: String,
    role: Role,
}

/// Verifier backed by the identity provider's HTTP endpoint
pub struct HttpTokenVerifier {
    client: reqwest::Client,
    config: AuthServiceConfig,
}

impl HttpTokenVerifier {
    pub fn new(config: AuthServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Verification, AuthError> {
        if token.trim().is_empty() {
            return Ok(Verification::Invalid);
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&VerifyRequest { token });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(Verification::Invalid);
        }

        if !response.status().is_success() {
            return Err(AuthError::BadResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::BadResponse(e.to_string()))?;

        tracing::debug!(user_id = %body.user_id, "Token verified");
        Ok(Verification::Valid(Identity::new(body.user_id, body.role)))
    }
}

/// In-memory verifier for tests and adapter-less development
///
/// Knows a fixed set of tokens; everything else is `Invalid`.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token as valid for the given identity
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().insert(token.into(), identity);
    }

    pub fn with_token(token: impl Into<String>, identity: Identity) -> Self {
        let verifier = Self::new();
        verifier.insert(token, identity);
        verifier
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Verification, AuthError> {
        match self.tokens.read().get(token) {
            Some(identity) => Ok(Verification::Valid(identity.clone())),
            None => Ok(Verification::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier =
            StaticTokenVerifier::with_token("tok-1", Identity::new("alice", Role::User));

        let valid = verifier.verify("tok-1").await.unwrap();
        assert_eq!(
            valid.identity().unwrap().user_id,
            "alice".to_string()
        );

        let invalid = verifier.verify("tok-2").await.unwrap();
        assert_eq!(invalid, Verification::Invalid);
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid() {
        let verifier = HttpTokenVerifier::new(AuthServiceConfig::default());
        let outcome = verifier.verify("").await.unwrap();
        assert_eq!(outcome, Verification::Invalid);
    }
}
