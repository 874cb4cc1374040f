//! Connection acceptor and socket loop
//!
//! Authenticates the upgrade request, then runs one read loop per socket.
//! The loop is the single writer of connection state: frames are handled in
//! arrival order, the turn pipeline runs as a spawned task so the loop keeps
//! draining (and refusing) frames while a turn is in flight, and closing the
//! socket cancels whatever is still running.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use voice_gateway_auth::Verification;
use voice_gateway_core::Identity;

use crate::frames::ServerFrame;
use crate::outbox::{Outbox, Outgoing};
use crate::session::ConnectionSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Handle the WebSocket upgrade at `/`
///
/// The bearer token rides in the `token` query parameter. An invalid or
/// missing token rejects the upgrade with 401 when `REQUIRE_AUTH` is set and
/// falls back to an anonymous connection otherwise.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let mut identity: Option<Identity> = None;

    if let Some(token) = query.token.as_deref() {
        match state.verifier.verify(token).await {
            Ok(Verification::Valid(verified)) => identity = Some(verified),
            Ok(Verification::Invalid) => {
                tracing::debug!("Upgrade token rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token verification unavailable during upgrade");
            }
        }
    }

    if identity.is_none() && state.settings.require_auth {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let authenticated = identity.is_some();
    let (mut sink, mut stream) = socket.split();

    let (outbox, mut outbox_rx, mut overflow_rx) =
        Outbox::channel(state.settings.limits.outbox_capacity);

    // Writer task: sole owner of the sink. Exits when every sender is gone
    // or the send buffer overflows, closing with policy-violation.
    let mut writer_overflow = overflow_rx.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                item = outbox_rx.recv() => match item {
                    Some(Outgoing::Frame(frame)) => {
                        let json = serde_json::to_string(&frame).unwrap();
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outgoing::Pong(payload)) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                changed = writer_overflow.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *writer_overflow.borrow() {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "send buffer overflow".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        }
    });

    let connection_id = state.registry.register(
        identity
            .as_ref()
            .map(|i| i.user_id.as_str())
            .unwrap_or("anonymous"),
        outbox.clone(),
    );

    outbox.send(ServerFrame::ConnectionEstablished {
        message: "Connected to voice gateway".to_string(),
        authenticated,
    });

    let (turn_done_tx, mut turn_done_rx) = mpsc::channel(1);
    let mut session = ConnectionSession::new(
        state.settings.clone(),
        state.verifier.clone(),
        state.pipeline.clone(),
        state.registry.clone(),
        connection_id,
        outbox.clone(),
        turn_done_tx,
        identity,
    );

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                None => break,
                Some(Err(e)) => {
                    tracing::debug!(user_id = %session.user_id(), error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(Message::Text(text))) => session.on_text(&text).await,
                Some(Ok(Message::Binary(audio))) => session.on_binary(audio).await,
                Some(Ok(Message::Ping(payload))) => outbox.pong(payload),
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => break,
            },
            Some(()) = turn_done_rx.recv() => session.turn_completed().await,
            changed = overflow_rx.changed() => {
                if changed.is_err() || *overflow_rx.borrow() {
                    tracing::warn!(
                        user_id = %session.user_id(),
                        "Send buffer overflow, closing connection"
                    );
                    break;
                }
            }
        }
    }

    session.close();
    state.registry.deregister(session.user_id(), connection_id);
    tracing::info!(user_id = %session.user_id(), "Connection closed");

    // Every outbox clone is gone after these drops, so the writer drains what
    // is queued and exits on its own.
    drop(session);
    drop(outbox);
    let _ = writer.await;
}
