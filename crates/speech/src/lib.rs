//! Speech service adapters
//!
//! Thin clients for the external speech-to-text and text-to-speech engines.
//! Audio crosses these boundaries as opaque bytes: a full WAV container in,
//! MP3 out.

pub mod stt;
pub mod tts;
pub mod wav;

pub use stt::{HttpSttClient, RecognitionConfig, SpeechToText, StaticTranscriber};
pub use tts::{HttpTtsClient, StaticSynthesizer, TextToSpeech, VoiceConfig};
pub use wav::WavInfo;

use thiserror::Error;

/// Speech adapter errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio payload rejected: {0}")]
    InvalidAudio(String),
}
