//! Transcription results from speech recognition

use serde::{Deserialize, Serialize};

/// Result of transcribing one utterance
///
/// An empty transcript is a legal outcome and means no speech was detected;
/// it is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// No speech detected
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if the transcript carries any speech
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_transcript() {
        assert!(Transcript::empty().is_empty());
        assert!(Transcript::new("   ", 0.3).is_empty());
        assert!(!Transcript::new("what time is it", 0.92).is_empty());
    }
}
