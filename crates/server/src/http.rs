//! HTTP endpoints
//!
//! Session bootstrap and health. Everything conversational happens on the
//! WebSocket; this surface exists so clients hold a `chatId` before they
//! open the socket.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_gateway_auth::Verification;
use voice_gateway_core::{Identity, NewMessage};

use crate::connection::ws_handler;
use crate::state::AppState;
use crate::ServerError;

/// Seed reply appended to every new session
pub const GREETING_TEXT: &str = "How can I help you today?";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/new", post(create_chat))
        .route("/api/health", get(health_check))
        // The conversational socket lives at the root path.
        .route("/", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct NewChatRequest {
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewChatData {
    chat_id: String,
    title: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

/// `POST /api/chat/new` — create a session and seed the greeting
async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewChatRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let identity = authenticate_bearer(&state, &headers).await?;

    let session = state
        .store
        .create_session(&identity.user_id, &request.title)
        .await?;

    let greeting = NewMessage::assistant(GREETING_TEXT);
    state
        .store
        .append_message(&session.chat_id, &identity.user_id, &greeting)
        .await?;

    tracing::info!(
        chat_id = %session.chat_id,
        user_id = %identity.user_id,
        "Chat session bootstrapped"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": NewChatData {
                chat_id: session.chat_id,
                title: session.title,
                created_at: session.created_at,
                last_updated: session.last_updated,
            },
        })),
    ))
}

/// `GET /api/health`
async fn health_check() -> &'static str {
    "Healthy"
}

async fn authenticate_bearer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Identity, ServerError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServerError::Auth("Missing bearer token".to_string()))?;

    match state.verifier.verify(token).await {
        Ok(Verification::Valid(identity)) => Ok(identity),
        Ok(Verification::Invalid) => Err(ServerError::Auth("Invalid token".to_string())),
        Err(e) => Err(ServerError::Internal(format!(
            "token verification unavailable: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use voice_gateway_auth::StaticTokenVerifier;
    use voice_gateway_config::Settings;
    use voice_gateway_core::{MessageRole, Role};
    use voice_gateway_persistence::{ChatStore, MemoryChatStore};
    use voice_gateway_resolver::RuleBasedResolver;
    use voice_gateway_speech::{StaticSynthesizer, StaticTranscriber};

    fn test_state(store: Arc<MemoryChatStore>) -> AppState {
        let verifier = StaticTokenVerifier::with_token(
            "tok-alice",
            Identity::new("alice", Role::User),
        );
        AppState::new(
            Settings::default(),
            Arc::new(verifier),
            Arc::new(StaticTranscriber::silent()),
            Arc::new(StaticSynthesizer::returning(vec![0u8; 4])),
            Arc::new(RuleBasedResolver::new()),
            store,
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_router_creation() {
        let state = test_state(Arc::new(MemoryChatStore::new()));
        let _ = create_router(state);
    }

    #[tokio::test]
    async fn test_create_chat_seeds_greeting() {
        let store = Arc::new(MemoryChatStore::new());
        let state = test_state(store.clone());

        let response = create_chat(
            State(state),
            bearer("tok-alice"),
            Json(NewChatRequest {
                title: "T".to_string(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let sessions = store.list_sessions("alice").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "T");

        let messages = store
            .list_messages(&sessions[0].chat_id, "alice")
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert_eq!(messages[0].text, GREETING_TEXT);
    }

    #[tokio::test]
    async fn test_create_chat_rejects_bad_token() {
        let state = test_state(Arc::new(MemoryChatStore::new()));

        let result = create_chat(
            State(state.clone()),
            bearer("tok-mallory"),
            Json(NewChatRequest {
                title: "T".to_string(),
            }),
        )
        .await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let result = create_chat(
            State(state),
            HeaderMap::new(),
            Json(NewChatRequest {
                title: "T".to_string(),
            }),
        )
        .await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_chat_store_failure_is_500() {
        let store = Arc::new(MemoryChatStore::new());
        store.set_fail_writes(true);
        let state = test_state(store);

        let result = create_chat(
            State(state),
            bearer("tok-alice"),
            Json(NewChatRequest {
                title: "T".to_string(),
            }),
        )
        .await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health_check().await, "Healthy");
    }
}
