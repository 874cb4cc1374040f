//! Application state
//!
//! Shared adapter clients and the connection registry. Everything here is
//! safe for concurrent use; per-connection mutable state lives in the
//! session, never in this struct.

use std::sync::Arc;

use voice_gateway_auth::TokenVerifier;
use voice_gateway_config::Settings;
use voice_gateway_persistence::ChatStore;
use voice_gateway_resolver::QueryResolver;
use voice_gateway_speech::{SpeechToText, TextToSpeech};

use crate::pipeline::TurnPipeline;
use crate::registry::ConnectionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub store: Arc<dyn ChatStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub pipeline: Arc<TurnPipeline>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        verifier: Arc<dyn TokenVerifier>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        resolver: Arc<dyn QueryResolver>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let pipeline = Arc::new(TurnPipeline::new(
            &settings,
            stt,
            tts,
            resolver,
            store.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            verifier,
            store,
            registry: Arc::new(ConnectionRegistry::new()),
            pipeline,
        }
    }
}
