//! Turn pipeline
//!
//! Drives one voice or text turn through its ordered phases: recognise,
//! persist the user utterance, resolve, synthesise, persist the reply, emit.
//! Each phase may fail independently; the failure policy keeps the persisted
//! transcript consistent with what the client was told:
//!
//! - no durable user utterance, no assistant reply;
//! - a resolver failure still answers (with a canned apology) because the
//!   utterance is already durable;
//! - a synthesis failure degrades to text-only;
//! - a reply-persist failure is logged for operators but never surfaced,
//!   the user already has their answer.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::time::timeout;

use voice_gateway_config::Settings;
use voice_gateway_core::{NewMessage, SourceType};
use voice_gateway_persistence::{ChatStore, StoreError};
use voice_gateway_resolver::QueryResolver;
use voice_gateway_speech::{RecognitionConfig, SpeechToText, TextToSpeech, VoiceConfig, WavInfo};

use crate::frames::{ServerFrame, TurnFailureReason};
use crate::outbox::Outbox;

/// Spoken when the query engine cannot produce an answer
pub const APOLOGY_TEXT: &str = "I'm sorry, I couldn't understand your query";

/// Input for one turn
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Typed text
    Text(String),
    /// One complete WAV utterance
    Audio(Vec<u8>),
}

/// Everything the pipeline needs to run one turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub chat_id: String,
    pub input: TurnInput,
}

struct Deadlines {
    stt: Duration,
    resolver: Duration,
    tts: Duration,
    store: Duration,
}

/// Orchestrates the external collaborators for one turn at a time
pub struct TurnPipeline {
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    resolver: Arc<dyn QueryResolver>,
    store: Arc<dyn ChatStore>,
    recognition: RecognitionConfig,
    voice: VoiceConfig,
    deadlines: Deadlines,
}

impl TurnPipeline {
    pub fn new(
        settings: &Settings,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        resolver: Arc<dyn QueryResolver>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            stt,
            tts,
            resolver,
            store,
            recognition: RecognitionConfig::from_settings(&settings.stt),
            voice: VoiceConfig::from_settings(&settings.tts),
            deadlines: Deadlines {
                stt: Duration::from_secs(settings.stt.timeout_seconds),
                resolver: Duration::from_secs(settings.resolver.timeout_seconds),
                tts: Duration::from_secs(settings.tts.timeout_seconds),
                store: Duration::from_secs(settings.store.timeout_seconds),
            },
        }
    }

    /// Run one turn to completion, pushing replies in order
    ///
    /// Every outcome, success or failure, ends with the turn closed and the
    /// connection alive. Cancellation (the caller dropping this future) is
    /// safe at any suspension point because message ids are assigned before
    /// the writes.
    pub async fn run(&self, request: TurnRequest, outbox: &Outbox) {
        let TurnRequest {
            user_id,
            chat_id,
            input,
        } = request;

        // Phase 1: recognise (audio turns only).
        let (utterance, source) = match input {
            TurnInput::Text(text) => (text, SourceType::Text),
            TurnInput::Audio(audio) => {
                if audio.is_empty() {
                    outbox.send(ServerFrame::speech_failed(TurnFailureReason::NoSpeech));
                    return;
                }

                match WavInfo::parse(&audio) {
                    Some(info) => tracing::debug!(
                        sample_rate_hz = info.sample_rate_hz,
                        channels = info.channels,
                        bytes = audio.len(),
                        "Audio turn started"
                    ),
                    None => tracing::debug!(
                        bytes = audio.len(),
                        "Audio turn started with unrecognised container"
                    ),
                }

                let transcript = match timeout(
                    self.deadlines.stt,
                    self.stt.transcribe(&audio, &self.recognition),
                )
                .await
                {
                    Ok(Ok(transcript)) => transcript,
                    Ok(Err(e)) => {
                        tracing::warn!(user_id = %user_id, error = %e, "Recognition failed");
                        outbox.send(ServerFrame::speech_failed(TurnFailureReason::SttFailed));
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(user_id = %user_id, "Recognition deadline exceeded");
                        outbox.send(ServerFrame::speech_failed(TurnFailureReason::SttFailed));
                        return;
                    }
                };

                if transcript.is_empty() {
                    outbox.send(ServerFrame::speech_failed(TurnFailureReason::NoSpeech));
                    return;
                }

                tracing::debug!(
                    user_id = %user_id,
                    confidence = transcript.confidence,
                    "Transcribed utterance"
                );
                (transcript.text, SourceType::Voice)
            }
        };

        // Phase 2: the user utterance must be durable before any reply is
        // produced, or the transcript could show an answer to nothing.
        let user_message = NewMessage::user(&utterance, source);
        match timeout(
            self.deadlines.store,
            self.store.append_message(&chat_id, &user_id, &user_message),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(StoreError::Forbidden(_))) => {
                tracing::warn!(user_id = %user_id, chat_id = %chat_id, "Rejected turn on foreign session");
                outbox.send(ServerFrame::error("forbidden"));
                return;
            }
            Ok(Err(StoreError::NotFound(_))) => {
                outbox.send(ServerFrame::error("Chat session not found"));
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(user_id = %user_id, chat_id = %chat_id, error = %e, "Failed to persist user message");
                outbox.send(ServerFrame::error("persist_failed"));
                return;
            }
            Err(_) => {
                tracing::error!(user_id = %user_id, chat_id = %chat_id, "Store deadline exceeded persisting user message");
                outbox.send(ServerFrame::error("persist_failed"));
                return;
            }
        }

        // Phase 3: resolve.
        let resolution = match timeout(
            self.deadlines.resolver,
            self.resolver.resolve(&user_id, &utterance),
        )
        .await
        {
            Ok(Ok(resolution)) => resolution,
            outcome => {
                match outcome {
                    Ok(Err(e)) => {
                        tracing::warn!(user_id = %user_id, error = %e, "Query resolution failed")
                    }
                    _ => tracing::warn!(user_id = %user_id, "Query resolution deadline exceeded"),
                }

                let apology = NewMessage::assistant(APOLOGY_TEXT).ordered_after(&user_message);
                match timeout(
                    self.deadlines.store,
                    self.store.append_message(&chat_id, &user_id, &apology),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(chat_id = %chat_id, error = %e, "Failed to persist apology reply")
                    }
                    Err(_) => {
                        tracing::error!(chat_id = %chat_id, "Store deadline exceeded persisting apology reply")
                    }
                }

                outbox.send(ServerFrame::speech_ok(utterance, APOLOGY_TEXT, None));
                return;
            }
        };

        // Phase 4: synthesise; losing audio does not lose the answer.
        let audio = match timeout(
            self.deadlines.tts,
            self.tts.synthesize(&resolution.answer, &self.voice),
        )
        .await
        {
            Ok(Ok(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Synthesis failed, replying text-only");
                None
            }
            Err(_) => {
                tracing::warn!(user_id = %user_id, "Synthesis deadline exceeded, replying text-only");
                None
            }
        };

        // Phase 5: persist the reply. Operators alert on this failure; the
        // client is not told because the answer below is already committed.
        let assistant_message =
            NewMessage::assistant(&resolution.answer).ordered_after(&user_message);
        match timeout(
            self.deadlines.store,
            self.store
                .append_message(&chat_id, &user_id, &assistant_message),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to persist assistant message, transcript inconsistent");
            }
            Err(_) => {
                tracing::error!(chat_id = %chat_id, "Store deadline exceeded persisting assistant message, transcript inconsistent");
            }
        }

        // Phase 6: emit, text before audio, contiguously.
        outbox.send(ServerFrame::speech_ok(
            utterance,
            resolution.answer,
            Some(resolution.metadata),
        ));
        if let Some(bytes) = audio {
            outbox.send(ServerFrame::AudioContent {
                audio_content: BASE64.encode(bytes),
            });
        }
    }
}
