//! Text-to-speech adapter

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use voice_gateway_config::TtsServiceConfig;

use crate::SpeechError;

/// Providers cap synthesis input length; longer answers are truncated with an
/// ellipsis rather than failing the whole turn.
const MAX_TTS_INPUT_CHARS: usize = 4500;

/// Voice selection options
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub language_code: String,
    pub voice_name: String,
    pub gender: String,
    pub speaking_rate: f32,
}

impl VoiceConfig {
    pub fn from_settings(settings: &TtsServiceConfig) -> Self {
        Self {
            language_code: settings.language_code.clone(),
            voice_name: settings.voice_name.clone(),
            gender: settings.gender.clone(),
            speaking_rate: settings.speaking_rate,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::from_settings(&TtsServiceConfig::default())
    }
}

/// Text-to-speech engine; output encoding is MP3
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize spoken audio for `text`
    ///
    /// Empty input yields empty audio without calling the provider.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError>;
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Client for the remote synthesis service
pub struct HttpTtsClient {
    client: reqwest::Client,
    config: TtsServiceConfig,
}

impl HttpTtsClient {
    pub fn new(config: TtsServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextToSpeech for HttpTtsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let truncated;
        let text = if text.chars().count() > MAX_TTS_INPUT_CHARS {
            truncated = text
                .chars()
                .take(MAX_TTS_INPUT_CHARS)
                .collect::<String>()
                + "...";
            tracing::warn!(chars = text.chars().count(), "Synthesis input truncated");
            truncated.as_str()
        } else {
            text
        };

        let body = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &voice.language_code,
                name: &voice.voice_name,
                ssml_gender: &voice.gender,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: voice.speaking_rate,
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
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Synthesis(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let audio = BASE64
            .decode(parsed.audio_content.as_bytes())
            .map_err(|e| SpeechError::Synthesis(format!("invalid audio payload: {e}")))?;

        tracing::debug!(bytes = audio.len(), "Synthesis complete");
        Ok(audio)
    }
}

/// Deterministic synthesizer for tests
pub struct StaticSynthesizer {
    audio: Vec<u8>,
    fail: bool,
}

impl StaticSynthesizer {
    pub fn returning(audio: Vec<u8>) -> Self {
        Self { audio, fail: false }
    }

    /// Synthesizer whose calls always fail
    pub fn failing() -> Self {
        Self {
            audio: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TextToSpeech for StaticSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError> {
        if self.fail {
            return Err(SpeechError::Synthesis("engine offline".to_string()));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.audio.clone())
    }
}
