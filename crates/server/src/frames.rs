//! Wire frames and the inbound demultiplexer
//!
//! Control traffic rides on text frames as JSON envelopes with a `type`
//! discriminator; audio rides on binary frames as a complete WAV container.
//! Everything the server emits is a text frame.

use serde::{Deserialize, Serialize};

use voice_gateway_core::QueryMetadata;

/// Inbound control frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Re-verify mid-connection
    Auth { token: String },
    /// Set the user id for anonymous flows; ignored once authenticated
    UserInfo {
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Bind the connection to a session; ownership is validated on the next
    /// persist
    SetChatId {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    /// Advisory: the client is about to send audio
    StartStream,
    /// Advisory: the turn begins when the binary frame arrives
    EndStream,
    /// Begin a text turn
    TextMessage { text: String },
    /// Deprecated; accepted and ignored
    ClearContext,
}

impl ControlFrame {
    /// Would handling this frame start a new turn?
    pub fn is_turn_initiating(&self) -> bool {
        matches!(self, ControlFrame::TextMessage { .. })
    }
}

const KNOWN_TYPES: [&str; 7] = [
    "auth",
    "user_info",
    "set_chat_id",
    "start_stream",
    "end_stream",
    "text_message",
    "clear_context",
];

/// Why a text frame could not be demultiplexed into a control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Not a JSON object with the expected envelope shape
    Invalid,
    /// Well-formed envelope carrying an unrecognised `type`
    UnknownType(String),
}

/// Classify an inbound text frame
pub fn parse_control(text: &str) -> Result<ControlFrame, FrameParseError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| FrameParseError::Invalid)?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(FrameParseError::Invalid)?
        .to_string();

    match serde_json::from_value::<ControlFrame>(value) {
        Ok(frame) => Ok(frame),
        Err(_) if KNOWN_TYPES.contains(&tag.as_str()) => Err(FrameParseError::Invalid),
        Err(_) => Err(FrameParseError::UnknownType(tag)),
    }
}

/// Reason a turn ended without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnFailureReason {
    NoSpeech,
    SttFailed,
}

/// Outbound reply frame
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished {
        message: String,
        authenticated: bool,
    },
    AuthSuccess {
        #[serde(rename = "userId")]
        user_id: String,
    },
    AuthError {
        error: String,
    },
    SpeechResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcription: Option<String>,
        #[serde(rename = "textResponse", skip_serializing_if = "Option::is_none")]
        text_response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<QueryMetadata>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<TurnFailureReason>,
    },
    AudioContent {
        #[serde(rename = "audioContent")]
        audio_content: String,
    },
    Error {
        error: String,
    },
}

impl ServerFrame {
    /// Successful turn reply
    pub fn speech_ok(
        transcription: impl Into<String>,
        text_response: impl Into<String>,
        metadata: Option<QueryMetadata>,
    ) -> Self {
        ServerFrame::SpeechResponse {
            success: true,
            transcription: Some(transcription.into()),
            text_response: Some(text_response.into()),
            metadata,
            reason: None,
        }
    }

    /// Turn ended without an answer
    pub fn speech_failed(reason: TurnFailureReason) -> Self {
        ServerFrame::SpeechResponse {
            success: false,
            transcription: None,
            text_response: None,
            metadata: None,
            reason: Some(reason),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_controls() {
        let frame = parse_control(r#"{"type":"set_chat_id","chatId":"S1"}"#).unwrap();
        assert_eq!(
            frame,
            ControlFrame::SetChatId {
                chat_id: "S1".to_string()
            }
        );

        let frame = parse_control(r#"{"type":"text_message","text":"hello"}"#).unwrap();
        assert!(frame.is_turn_initiating());

        let frame = parse_control(r#"{"type":"clear_context"}"#).unwrap();
        assert_eq!(frame, ControlFrame::ClearContext);
    }

    #[test]
    fn test_parse_invalid_and_unknown() {
        assert_eq!(parse_control("not json"), Err(FrameParseError::Invalid));
        assert_eq!(parse_control("[1,2,3]"), Err(FrameParseError::Invalid));
        assert_eq!(
            parse_control(r#"{"text":"no discriminator"}"#),
            Err(FrameParseError::Invalid)
        );
        // Recognised type with a missing field is malformed, not unknown.
        assert_eq!(
            parse_control(r#"{"type":"auth"}"#),
            Err(FrameParseError::Invalid)
        );
        assert_eq!(
            parse_control(r#"{"type":"video_frame"}"#),
            Err(FrameParseError::UnknownType("video_frame".to_string()))
        );
    }

    #[test]
    fn test_speech_response_wire_shapes() {
        let ok = ServerFrame::speech_ok("hello", "hi there", None);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["type"], "speech_response");
        assert_eq!(json["success"], true);
        assert_eq!(json["transcription"], "hello");
        assert_eq!(json["textResponse"], "hi there");
        assert!(json.get("reason").is_none());

        let failed = ServerFrame::speech_failed(TurnFailureReason::NoSpeech);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "no_speech");
        assert!(json.get("transcription").is_none());
    }
}
