//! End-to-end gateway tests
//!
//! Drives the session manager and turn pipeline against in-memory fakes,
//! covering the turn state machine, the per-phase failure policy, reply
//! ordering, and ownership enforcement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use voice_gateway_auth::{StaticTokenVerifier, TokenVerifier};
use voice_gateway_config::Settings;
use voice_gateway_core::{
    Identity, MessageRole, NewMessage, QueryIntent, Resolution, Role, SourceType, Transcript,
};
use voice_gateway_persistence::{ChatStore, MemoryChatStore};
use voice_gateway_resolver::{QueryResolver, ResolverError, RuleBasedResolver};
use voice_gateway_server::frames::{ServerFrame, TurnFailureReason};
use voice_gateway_server::http::GREETING_TEXT;
use voice_gateway_server::outbox::{Outbox, Outgoing};
use voice_gateway_server::pipeline::{TurnPipeline, APOLOGY_TEXT};
use voice_gateway_server::registry::ConnectionRegistry;
use voice_gateway_server::session::{ConnectionSession, TurnState};
use voice_gateway_speech::stt::RecognitionConfig;
use voice_gateway_speech::wav::build_wav;
use voice_gateway_speech::{SpeechError, SpeechToText, StaticSynthesizer, StaticTranscriber, TextToSpeech};

const MP3_BYTES: &[u8] = &[0x49, 0x44, 0x33, 0x04, 0x00, 0x00];

struct Harness {
    session: ConnectionSession,
    outbox_rx: mpsc::Receiver<Outgoing>,
    done_rx: mpsc::Receiver<()>,
    store: Arc<MemoryChatStore>,
}

fn harness(
    settings: Settings,
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    resolver: Arc<dyn QueryResolver>,
    store: Arc<MemoryChatStore>,
    identity: Option<Identity>,
) -> Harness {
    let pipeline = Arc::new(TurnPipeline::new(
        &settings,
        stt,
        tts,
        resolver,
        store.clone(),
    ));
    let registry = Arc::new(ConnectionRegistry::new());
    let (outbox, outbox_rx, _overflow) = Outbox::channel(settings.limits.outbox_capacity);
    let (done_tx, done_rx) = mpsc::channel(1);

    let connection_id = registry.register(
        identity
            .as_ref()
            .map(|i| i.user_id.as_str())
            .unwrap_or("anonymous"),
        outbox.clone(),
    );

    let verifier: Arc<dyn TokenVerifier> = Arc::new(StaticTokenVerifier::with_token(
        "tok-alice",
        Identity::new("alice", Role::User),
    ));

    let session = ConnectionSession::new(
        Arc::new(settings),
        verifier,
        pipeline,
        registry,
        connection_id,
        outbox,
        done_tx,
        identity,
    );

    Harness {
        session,
        outbox_rx,
        done_rx,
        store,
    }
}

fn text_harness(identity: Option<Identity>) -> Harness {
    harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        Arc::new(MemoryChatStore::new()),
        identity,
    )
}

fn alice() -> Option<Identity> {
    Some(Identity::new("alice", Role::User))
}

async fn bootstrap_chat(store: &MemoryChatStore, user: &str) -> String {
    let session = store.create_session(user, "T").await.unwrap();
    store
        .append_message(&session.chat_id, user, &NewMessage::assistant(GREETING_TEXT))
        .await
        .unwrap();
    session.chat_id
}

impl Harness {
    async fn send(&mut self, json: &str) {
        self.session.on_text(json).await;
    }

    async fn set_chat(&mut self, chat_id: &str) {
        self.send(&format!(r#"{{"type":"set_chat_id","chatId":"{chat_id}"}}"#))
            .await;
    }

    async fn next_frame(&mut self) -> ServerFrame {
        loop {
            let item = timeout(Duration::from_secs(5), self.outbox_rx.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("outbox closed");
            if let Outgoing::Frame(frame) = item {
                return frame;
            }
        }
    }

    async fn expect_silence(&mut self) {
        let got = timeout(Duration::from_millis(100), self.outbox_rx.recv()).await;
        assert!(got.is_err(), "expected no frame, got {:?}", got.unwrap());
    }

    async fn complete_turn(&mut self) {
        timeout(Duration::from_secs(5), self.done_rx.recv())
            .await
            .expect("turn did not complete")
            .expect("turn channel closed");
        self.session.turn_completed().await;
    }
}

fn expect_speech_ok(frame: ServerFrame) -> (String, String, Option<QueryIntent>) {
    match frame {
        ServerFrame::SpeechResponse {
            success: true,
            transcription: Some(transcription),
            text_response: Some(text_response),
            metadata,
            ..
        } => (transcription, text_response, metadata.map(|m| m.intent)),
        other => panic!("expected successful speech_response, got {other:?}"),
    }
}

fn expect_error(frame: ServerFrame) -> String {
    match frame {
        ServerFrame::Error { error } => error,
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn text_turn_happy_path() {
    let mut h = text_harness(alice());
    let chat_id = bootstrap_chat(&h.store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;

    let (transcription, answer, _) = expect_speech_ok(h.next_frame().await);
    assert_eq!(transcription, "hello");
    assert_eq!(answer, "You said: hello");

    match h.next_frame().await {
        ServerFrame::AudioContent { audio_content } => assert!(!audio_content.is_empty()),
        other => panic!("expected audio_content, got {other:?}"),
    }

    let messages = h.store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(messages[0].text, GREETING_TEXT);
    assert_eq!(messages[1].role, MessageRole::User);
    assert_eq!(messages[1].text, "hello");
    assert_eq!(messages[1].source_type, SourceType::Text);
    assert_eq!(messages[2].role, MessageRole::Assistant);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn voice_turn_happy_path() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::returning("what time is it", 0.94)),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"start_stream"}"#).await;
    assert_eq!(h.session.turn_state(), TurnState::AwaitingAudio);

    h.session
        .on_binary(build_wav(16000, &[0u8; 3200]))
        .await;
    assert_eq!(h.session.turn_state(), TurnState::Processing);
    h.complete_turn().await;

    let (transcription, _, intent) = expect_speech_ok(h.next_frame().await);
    assert_eq!(transcription, "what time is it");
    assert_eq!(intent, Some(QueryIntent::TimeQuery));

    assert!(matches!(
        h.next_frame().await,
        ServerFrame::AudioContent { .. }
    ));

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages[1].source_type, SourceType::Voice);
    assert_eq!(messages[1].text, "what time is it");
}

#[tokio::test]
async fn silent_audio_ends_turn_without_persisting() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.session.on_binary(build_wav(16000, &[])).await;
    h.complete_turn().await;

    match h.next_frame().await {
        ServerFrame::SpeechResponse {
            success: false,
            reason: Some(TurnFailureReason::NoSpeech),
            ..
        } => {}
        other => panic!("expected no_speech, got {other:?}"),
    }

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 1, "nothing may persist on a silent turn");
    assert_eq!(h.session.turn_state(), TurnState::Idle);
}

#[tokio::test]
async fn stt_failure_ends_turn_cleanly() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::failing()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.session.on_binary(build_wav(16000, &[0u8; 320])).await;
    h.complete_turn().await;

    match h.next_frame().await {
        ServerFrame::SpeechResponse {
            success: false,
            reason: Some(TurnFailureReason::SttFailed),
            ..
        } => {}
        other => panic!("expected stt_failed, got {other:?}"),
    }

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn tts_failure_still_delivers_the_answer() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::failing()),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;

    let (_, answer, _) = expect_speech_ok(h.next_frame().await);
    assert_eq!(answer, "You said: hello");
    h.expect_silence().await;

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 3, "both sides persist even without audio");
}

#[tokio::test]
async fn resolver_failure_persists_an_apology() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::failing()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;

    let (_, answer, intent) = expect_speech_ok(h.next_frame().await);
    assert_eq!(answer, APOLOGY_TEXT);
    assert_eq!(intent, None);
    h.expect_silence().await;

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].text, APOLOGY_TEXT);
}

#[tokio::test]
async fn foreign_session_is_forbidden() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        Some(Identity::new("bob", Role::User)),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;

    assert_eq!(expect_error(h.next_frame().await), "forbidden");

    let messages = store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 1, "no message may land in a foreign session");
}

#[tokio::test]
async fn busy_rejects_a_second_turn() {
    let mut h = text_harness(alice());
    let chat_id = bootstrap_chat(&h.store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"first"}"#).await;
    h.send(r#"{"type":"text_message","text":"second"}"#).await;
    h.complete_turn().await;

    let mut busy = 0;
    let mut speech = 0;
    let mut audio = 0;
    for _ in 0..3 {
        match h.next_frame().await {
            ServerFrame::Error { error } if error == "Busy" => busy += 1,
            ServerFrame::SpeechResponse { success: true, .. } => speech += 1,
            ServerFrame::AudioContent { .. } => audio += 1,
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!((busy, speech, audio), (1, 1, 1));

    let messages = h.store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 3, "the rejected turn must not persist");
}

#[tokio::test]
async fn binary_while_processing_is_busy() {
    let mut h = text_harness(alice());
    let chat_id = bootstrap_chat(&h.store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"first"}"#).await;
    h.session.on_binary(build_wav(16000, &[0u8; 64])).await;
    assert_eq!(h.session.turn_state(), TurnState::Processing);
    h.complete_turn().await;

    let mut saw_busy = false;
    for _ in 0..3 {
        if let ServerFrame::Error { error } = h.next_frame().await {
            assert_eq!(error, "Busy");
            saw_busy = true;
        }
    }
    assert!(saw_busy);
}

#[tokio::test]
async fn guards_check_chat_binding_and_auth() {
    // No chat bound.
    let mut h = text_harness(alice());
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    assert_eq!(expect_error(h.next_frame().await), "No active chat session");
    assert_eq!(h.session.turn_state(), TurnState::Idle);

    // Auth required and not yet authenticated.
    let mut settings = Settings::default();
    settings.require_auth = true;
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        settings,
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        None,
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    assert_eq!(expect_error(h.next_frame().await), "Authentication required");

    // Authenticate mid-connection, then the same turn succeeds.
    h.send(r#"{"type":"auth","token":"tok-alice"}"#).await;
    match h.next_frame().await {
        ServerFrame::AuthSuccess { user_id } => assert_eq!(user_id, "alice"),
        other => panic!("expected auth_success, got {other:?}"),
    }

    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;
    expect_speech_ok(h.next_frame().await);
}

#[tokio::test]
async fn invalid_tokens_reply_auth_error() {
    let mut h = text_harness(None);
    h.send(r#"{"type":"auth","token":"tok-wrong"}"#).await;
    match h.next_frame().await {
        ServerFrame::AuthError { .. } => {}
        other => panic!("expected auth_error, got {other:?}"),
    }
    assert!(!h.session.is_authenticated());
}

#[tokio::test]
async fn user_info_binds_anonymous_connections_only() {
    let mut h = text_harness(None);
    h.send(r#"{"type":"user_info","userId":"guest-7"}"#).await;
    assert_eq!(h.session.user_id(), "guest-7");

    // Once authenticated, user_info no longer applies.
    h.send(r#"{"type":"auth","token":"tok-alice"}"#).await;
    h.next_frame().await;
    h.send(r#"{"type":"user_info","userId":"guest-8"}"#).await;
    assert_eq!(h.session.user_id(), "alice");
}

#[tokio::test]
async fn malformed_and_unknown_frames() {
    let mut h = text_harness(alice());

    h.send("definitely not json").await;
    assert_eq!(
        expect_error(h.next_frame().await),
        "Invalid JSON message format"
    );

    h.send(r#"{"type":"video_frame"}"#).await;
    assert_eq!(expect_error(h.next_frame().await), "Unknown control type");

    // Advisory frames produce no reply.
    h.send(r#"{"type":"clear_context"}"#).await;
    h.send(r#"{"type":"end_stream"}"#).await;
    h.expect_silence().await;
}

#[tokio::test]
async fn oversized_audio_is_rejected() {
    let mut settings = Settings::default();
    settings.limits.max_audio_bytes = 1024;
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        settings,
        Arc::new(StaticTranscriber::returning("hi", 0.9)),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.session.on_binary(vec![0u8; 4096]).await;
    assert_eq!(expect_error(h.next_frame().await), "Audio payload too large");
    assert_eq!(h.session.turn_state(), TurnState::Idle);
}

#[tokio::test]
async fn control_frames_buffer_during_a_turn() {
    let mut h = text_harness(alice());
    let first_chat = bootstrap_chat(&h.store, "alice").await;
    let second_chat = bootstrap_chat(&h.store, "alice").await;

    h.set_chat(&first_chat).await;
    h.send(r#"{"type":"text_message","text":"one"}"#).await;
    // Arrives mid-turn; applied only after the turn completes.
    h.set_chat(&second_chat).await;
    h.complete_turn().await;

    h.send(r#"{"type":"text_message","text":"two"}"#).await;
    h.complete_turn().await;

    let first = h.store.list_messages(&first_chat, "alice").await.unwrap();
    let second = h.store.list_messages(&second_chat, "alice").await.unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().any(|m| m.text == "one"));
    assert_eq!(second.len(), 3);
    assert!(second.iter().any(|m| m.text == "two"));
}

#[tokio::test]
async fn replies_stay_ordered_across_turns() {
    let mut h = text_harness(alice());
    let chat_id = bootstrap_chat(&h.store, "alice").await;
    h.set_chat(&chat_id).await;

    h.send(r#"{"type":"text_message","text":"one"}"#).await;
    h.complete_turn().await;
    h.send(r#"{"type":"text_message","text":"two"}"#).await;
    h.complete_turn().await;

    let (t1, _, _) = expect_speech_ok(h.next_frame().await);
    assert_eq!(t1, "one");
    assert!(matches!(
        h.next_frame().await,
        ServerFrame::AudioContent { .. }
    ));
    let (t2, _, _) = expect_speech_ok(h.next_frame().await);
    assert_eq!(t2, "two");
    assert!(matches!(
        h.next_frame().await,
        ServerFrame::AudioContent { .. }
    ));
}

/// Resolver wrapper that counts invocations
struct CountingResolver {
    calls: Arc<AtomicUsize>,
    inner: RuleBasedResolver,
}

#[async_trait::async_trait]
impl QueryResolver for CountingResolver {
    async fn resolve(&self, user_id: &str, query: &str) -> Result<Resolution, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(user_id, query).await
    }
}

#[tokio::test]
async fn persist_failure_never_reaches_the_resolver() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(StaticTranscriber::silent()),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(CountingResolver {
            calls: calls.clone(),
            inner: RuleBasedResolver::new(),
        }),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;
    store.set_fail_writes(true);

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"hello"}"#).await;
    h.complete_turn().await;

    assert_eq!(expect_error(h.next_frame().await), "persist_failed");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Transcriber that outlives any reasonable deadline
struct DelayedTranscriber;

#[async_trait::async_trait]
impl SpeechToText for DelayedTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _config: &RecognitionConfig,
    ) -> Result<Transcript, SpeechError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(Transcript::new("too late", 0.9))
    }
}

#[tokio::test(start_paused = true)]
async fn recognition_deadline_is_enforced() {
    let store = Arc::new(MemoryChatStore::new());
    let mut h = harness(
        Settings::default(),
        Arc::new(DelayedTranscriber),
        Arc::new(StaticSynthesizer::returning(MP3_BYTES.to_vec())),
        Arc::new(RuleBasedResolver::new()),
        store.clone(),
        alice(),
    );
    let chat_id = bootstrap_chat(&store, "alice").await;

    h.set_chat(&chat_id).await;
    h.session.on_binary(build_wav(16000, &[0u8; 320])).await;

    // The 15 s recognition deadline fires long before the engine answers.
    h.done_rx.recv().await.expect("turn channel closed");
    h.session.turn_completed().await;

    match h.next_frame().await {
        ServerFrame::SpeechResponse {
            success: false,
            reason: Some(TurnFailureReason::SttFailed),
            ..
        } => {}
        other => panic!("expected stt_failed, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_text_message_is_rejected_before_the_pipeline() {
    let mut h = text_harness(alice());
    let chat_id = bootstrap_chat(&h.store, "alice").await;

    h.set_chat(&chat_id).await;
    h.send(r#"{"type":"text_message","text":"   "}"#).await;
    assert_eq!(expect_error(h.next_frame().await), "Empty message text");
    assert_eq!(h.session.turn_state(), TurnState::Idle);

    let messages = h.store.list_messages(&chat_id, "alice").await.unwrap();
    assert_eq!(messages.len(), 1);
}
