//! Voice Gateway Server
//!
//! WebSocket and HTTP endpoints for the conversational gateway: session
//! bootstrap over REST, then a long-lived socket per client carrying control
//! frames and audio.

pub mod connection;
pub mod frames;
pub mod http;
pub mod outbox;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod state;

pub use connection::ws_handler;
pub use http::create_router;
pub use session::{ConnectionSession, TurnState};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use voice_gateway_persistence::StoreError;

/// Server errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::Store(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
