//! Query-resolution results from the context engine

use serde::{Deserialize, Serialize};

/// Classification of the resolved query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    WeatherQuery,
    TimeQuery,
    AccountQuery,
    HelpRequest,
    Unknown,
}

impl Default for QueryIntent {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Classification metadata attached to an answer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub intent: QueryIntent,
    /// Classification confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// A resolved answer with its classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Answer text to speak back to the user
    pub answer: String,
    pub metadata: QueryMetadata,
}

impl Resolution {
    pub fn new(answer: impl Into<String>, intent: QueryIntent, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            metadata: QueryMetadata { intent, confidence },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_wire_format() {
        let json = serde_json::to_string(&QueryIntent::TimeQuery).unwrap();
        assert_eq!(json, "\"TIME_QUERY\"");

        let parsed: QueryIntent = serde_json::from_str("\"WEATHER_QUERY\"").unwrap();
        assert_eq!(parsed, QueryIntent::WeatherQuery);
    }
}
