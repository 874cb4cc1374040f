//! Speech-to-text adapter

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use voice_gateway_config::SttServiceConfig;
use voice_gateway_core::Transcript;

use crate::SpeechError;

/// Maximum audio input size (10 MiB). Oversized utterances are rejected
/// before they reach the provider.
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Recognition request options
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    /// Audio encoding; inbound frames are 16-bit linear PCM
    pub encoding: String,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub enable_automatic_punctuation: bool,
    pub audio_channel_count: u32,
}

impl RecognitionConfig {
    pub fn from_settings(settings: &SttServiceConfig) -> Self {
        Self {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: settings.sample_rate_hz,
            language_code: settings.language_code.clone(),
            enable_automatic_punctuation: true,
            audio_channel_count: 1,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self::from_settings(&SttServiceConfig::default())
    }
}

/// Speech-to-text engine
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one complete utterance
    ///
    /// An empty transcript means no speech was detected and is not an error.
    async fn transcribe(
        &self,
        audio: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Transcript, SpeechError>;
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: &'a RecognitionConfig,
    audio: AudioContent,
}

#[derive(Debug, Serialize)]
struct AudioContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Client for the remote recognition service
pub struct HttpSttClient {
    client: reqwest::Client,
    config: SttServiceConfig,
}

impl HttpSttClient {
    pub fn new(config: SttServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSttClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Transcript, SpeechError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(SpeechError::InvalidAudio(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let body = RecognizeRequest {
            config,
            audio: AudioContent {
                content: BASE64.encode(audio),
            },
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&body);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SpeechError::Recognition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Recognition(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Recognition(e.to_string()))?;

        let transcript = parsed
            .results
            .into_iter()
            .next()
            .and_then(|r| r.alternatives.into_iter().next())
            .map(|a| Transcript::new(a.transcript, a.confidence))
            .unwrap_or_else(Transcript::empty);

        tracing::debug!(
            chars = transcript.text.len(),
            confidence = transcript.confidence,
            "Transcription complete"
        );
        Ok(transcript)
    }
}

/// Deterministic transcriber for tests
///
/// Returns a fixed transcript, or a recognition error when constructed
/// with `failing()`.
pub struct StaticTranscriber {
    transcript: Transcript,
    fail: bool,
}

impl StaticTranscriber {
    pub fn returning(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: Transcript::new(text, confidence),
            fail: false,
        }
    }

    /// Transcriber that hears nothing
    pub fn silent() -> Self {
        Self {
            transcript: Transcript::empty(),
            fail: false,
        }
    }

    /// Transcriber whose calls always fail
    pub fn failing() -> Self {
        Self {
            transcript: Transcript::empty(),
            fail: true,
        }
    }
}

#[async_trait]
impl SpeechToText for StaticTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _config: &RecognitionConfig,
    ) -> Result<Transcript, SpeechError> {
        if self.fail {
            return Err(SpeechError::Recognition("engine offline".to_string()));
        }
        Ok(self.transcript.clone())
    }
}
