//! Contextual query resolution
//!
//! The query engine is an external collaborator: given a user id and an
//! utterance it returns an answer plus classification metadata. The gateway
//! rejects empty utterances before this boundary is reached.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use voice_gateway_config::ResolverServiceConfig;
use voice_gateway_core::{QueryIntent, Resolution};

/// Resolver errors
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Query engine unreachable: {0}")]
    Unreachable(String),

    #[error("Query engine returned a malformed response: {0}")]
    BadResponse(String),
}

/// Context-aware query engine
#[async_trait]
pub trait QueryResolver: Send + Sync {
    /// Resolve `query` for `user_id` into an answer with metadata
    async fn resolve(&self, user_id: &str, query: &str) -> Result<Resolution, ResolverError>;
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    response: String,
    #[serde(default)]
    intent: Option<QueryIntent>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Client for the remote query engine
pub struct HttpQueryResolver {
    client: reqwest::Client,
    config: ResolverServiceConfig,
}

impl HttpQueryResolver {
    pub fn new(config: ResolverServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl QueryResolver for HttpQueryResolver {
    async fn resolve(&self, user_id: &str, query: &str) -> Result<Resolution, ResolverError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&ResolveRequest { user_id, query });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolverError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolverError::BadResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: ResolveResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::BadResponse(e.to_string()))?;

        // Engines that predate the classification fields answer without them.
        let resolution = Resolution::new(
            parsed.response,
            parsed.intent.unwrap_or_default(),
            parsed.confidence.unwrap_or(0.0),
        );

        tracing::debug!(
            user_id = %user_id,
            intent = ?resolution.metadata.intent,
            "Query resolved"
        );
        Ok(resolution)
    }
}

/// Keyword-matching resolver for tests and adapter-less development
///
/// Scores the utterance against a fixed keyword table per intent; the best
/// match wins, anything unmatched is `UNKNOWN`.
pub struct RuleBasedResolver {
    fail: bool,
}

impl RuleBasedResolver {
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// Resolver whose calls always fail
    pub fn failing() -> Self {
        Self { fail: true }
    }

    fn classify(query: &str) -> (QueryIntent, f32) {
        let table: [(QueryIntent, &[&str]); 4] = [
            (QueryIntent::WeatherQuery, &["weather", "rain", "sunny", "temperature"]),
            (QueryIntent::TimeQuery, &["time", "clock", "hour"]),
            (QueryIntent::AccountQuery, &["account", "balance", "profile"]),
            (QueryIntent::HelpRequest, &["help", "assist", "support"]),
        ];

        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower.split_whitespace().collect();

        let mut best = (QueryIntent::Unknown, 0.0f32);
        for (intent, keywords) in table {
            let hits = keywords
                .iter()
                .filter(|k| {
                    words
                        .iter()
                        .any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == **k)
                })
                .count();
            if hits > 0 {
                let score = 0.6 + 0.2 * hits.min(2) as f32;
                if score > best.1 {
                    best = (intent, score);
                }
            }
        }
        best
    }
}

impl Default for RuleBasedResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryResolver for RuleBasedResolver {
    async fn resolve(&self, _user_id: &str, query: &str) -> Result<Resolution, ResolverError> {
        if self.fail {
            return Err(ResolverError::Unreachable("engine offline".to_string()));
        }

        let (intent, confidence) = Self::classify(query);
        let answer = match intent {
            QueryIntent::WeatherQuery => "It looks clear for the rest of the day.".to_string(),
            QueryIntent::TimeQuery => "It is just past the hour.".to_string(),
            QueryIntent::AccountQuery => "Your account is in good standing.".to_string(),
            QueryIntent::HelpRequest => {
                "You can ask me about the weather, the time, or your account.".to_string()
            }
            QueryIntent::Unknown => format!("You said: {query}"),
        };

        Ok(Resolution::new(answer, intent, confidence))
    }
}
