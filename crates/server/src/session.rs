//! Per-connection session management
//!
//! One `ConnectionSession` per socket. It owns the connection state record:
//! identity, current chat binding, and the turn state machine. Frames are
//! handled one at a time in arrival order; while a turn is in flight,
//! non-turn-initiating control frames queue up and turn-initiating ones are
//! refused with `Busy`, which is what keeps reply ordering intact without any
//! locking across turns.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voice_gateway_auth::{TokenVerifier, Verification};
use voice_gateway_config::Settings;
use voice_gateway_core::Identity;

use crate::frames::{parse_control, ControlFrame, FrameParseError, ServerFrame};
use crate::outbox::Outbox;
use crate::pipeline::{TurnInput, TurnPipeline, TurnRequest};
use crate::registry::ConnectionRegistry;

/// Turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight
    Idle,
    /// Client announced audio is coming
    AwaitingAudio,
    /// A turn is running; new turns are refused
    Processing,
    /// Connection closed
    Closed,
}

/// Per-connection state and frame handling
pub struct ConnectionSession {
    settings: Arc<Settings>,
    verifier: Arc<dyn TokenVerifier>,
    pipeline: Arc<TurnPipeline>,
    registry: Arc<ConnectionRegistry>,
    connection_id: u64,
    outbox: Outbox,
    turn_done_tx: mpsc::Sender<()>,

    identity: Identity,
    authenticated: bool,
    current_chat_id: Option<String>,
    turn_state: TurnState,
    /// Control frames that arrived during a turn, replayed afterwards
    pending: VecDeque<ControlFrame>,
    turn_task: Option<JoinHandle<()>>,
}

impl ConnectionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        verifier: Arc<dyn TokenVerifier>,
        pipeline: Arc<TurnPipeline>,
        registry: Arc<ConnectionRegistry>,
        connection_id: u64,
        outbox: Outbox,
        turn_done_tx: mpsc::Sender<()>,
        identity: Option<Identity>,
    ) -> Self {
        let authenticated = identity.is_some();
        Self {
            settings,
            verifier,
            pipeline,
            registry,
            connection_id,
            outbox,
            turn_done_tx,
            identity: identity.unwrap_or_else(Identity::anonymous),
            authenticated,
            current_chat_id: None,
            turn_state: TurnState::Idle,
            pending: VecDeque::new(),
            turn_task: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn_state
    }

    /// Handle an inbound text frame
    pub async fn on_text(&mut self, text: &str) {
        let frame = match parse_control(text) {
            Ok(frame) => frame,
            Err(FrameParseError::Invalid) => {
                self.outbox
                    .send(ServerFrame::error("Invalid JSON message format"));
                return;
            }
            Err(FrameParseError::UnknownType(kind)) => {
                tracing::debug!(user_id = %self.identity.user_id, kind = %kind, "Unknown control type");
                self.outbox.send(ServerFrame::error("Unknown control type"));
                return;
            }
        };

        if self.turn_state == TurnState::Processing {
            if frame.is_turn_initiating() {
                self.outbox.send(ServerFrame::error("Busy"));
            } else {
                self.pending.push_back(frame);
            }
            return;
        }

        self.handle_control(frame).await;
    }

    /// Handle an inbound binary frame (one complete WAV utterance)
    pub async fn on_binary(&mut self, audio: Vec<u8>) {
        if audio.len() > self.settings.limits.max_audio_bytes {
            self.outbox
                .send(ServerFrame::error("Audio payload too large"));
            return;
        }

        if self.turn_state == TurnState::Processing {
            self.outbox.send(ServerFrame::error("Busy"));
            return;
        }

        self.begin_turn(TurnInput::Audio(audio));
    }

    async fn handle_control(&mut self, frame: ControlFrame) {
        match frame {
            ControlFrame::Auth { token } => self.authenticate(&token).await,
            ControlFrame::UserInfo { user_id } => {
                if self.authenticated {
                    tracing::debug!(
                        user_id = %self.identity.user_id,
                        "Ignoring user_info on authenticated connection"
                    );
                } else {
                    self.registry
                        .rekey(&self.identity.user_id, &user_id, self.connection_id);
                    self.identity.user_id = user_id;
                }
            }
            ControlFrame::SetChatId { chat_id } => {
                tracing::debug!(user_id = %self.identity.user_id, chat_id = %chat_id, "Chat bound");
                self.current_chat_id = Some(chat_id);
            }
            ControlFrame::StartStream => {
                if self.turn_state == TurnState::Idle {
                    self.turn_state = TurnState::AwaitingAudio;
                }
            }
            ControlFrame::EndStream => {
                // Advisory; the turn begins when the binary frame arrives.
            }
            ControlFrame::ClearContext => {
                tracing::debug!(user_id = %self.identity.user_id, "clear_context is deprecated, ignoring");
            }
            ControlFrame::TextMessage { text } => {
                if text.trim().is_empty() {
                    self.outbox.send(ServerFrame::error("Empty message text"));
                    return;
                }
                self.begin_turn(TurnInput::Text(text));
            }
        }
    }

    async fn authenticate(&mut self, token: &str) {
        match self.verifier.verify(token).await {
            Ok(Verification::Valid(identity)) => {
                self.registry.rekey(
                    &self.identity.user_id,
                    &identity.user_id,
                    self.connection_id,
                );
                tracing::info!(user_id = %identity.user_id, "Connection authenticated");
                self.identity = identity;
                self.authenticated = true;
                self.outbox.send(ServerFrame::AuthSuccess {
                    user_id: self.identity.user_id.clone(),
                });
            }
            Ok(Verification::Invalid) => {
                self.outbox.send(ServerFrame::AuthError {
                    error: "Invalid token".to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token verification unavailable");
                self.outbox.send(ServerFrame::AuthError {
                    error: "Verification unavailable".to_string(),
                });
            }
        }
    }

    fn begin_turn(&mut self, input: TurnInput) {
        if self.settings.require_auth && !self.authenticated {
            self.outbox
                .send(ServerFrame::error("Authentication required"));
            return;
        }

        let chat_id = match &self.current_chat_id {
            Some(chat_id) => chat_id.clone(),
            None => {
                self.outbox
                    .send(ServerFrame::error("No active chat session"));
                return;
            }
        };

        let request = TurnRequest {
            user_id: self.identity.user_id.clone(),
            chat_id,
            input,
        };

        self.turn_state = TurnState::Processing;

        let pipeline = self.pipeline.clone();
        let outbox = self.outbox.clone();
        let done = self.turn_done_tx.clone();
        self.turn_task = Some(tokio::spawn(async move {
            pipeline.run(request, &outbox).await;
            let _ = done.send(()).await;
        }));
    }

    /// Called when the in-flight turn has finished and its replies are queued
    pub async fn turn_completed(&mut self) {
        if self.turn_state == TurnState::Closed {
            return;
        }

        self.turn_state = TurnState::Idle;
        self.turn_task = None;

        // Replay control frames that arrived mid-turn, in order. Only
        // non-turn-initiating frames are ever queued, so this cannot start a
        // turn.
        while let Some(frame) = self.pending.pop_front() {
            self.handle_control(frame).await;
        }
    }

    /// Close the session, cancelling any in-flight turn
    ///
    /// Cancellation may race the store appends; ids were assigned before the
    /// writes, so a retried append cannot duplicate.
    pub fn close(&mut self) {
        self.turn_state = TurnState::Closed;
        if let Some(task) = self.turn_task.take() {
            task.abort();
        }
    }
}
