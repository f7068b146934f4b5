//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use parley_common::{ClientFrame, ServerFrame};

use crate::AppState;

use super::broadcast::{self, PROCESSING_FAILED};
use super::handshake::{self, Admission};
use super::presence;
use super::session::{Session, SessionState};

/// Close codes (4000-range for application-level).
const CLOSE_AUTH_FAILED: u16 = 4004;
const CLOSE_HANDSHAKE_TIMEOUT: u16 = 4009;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Advance the connection lifecycle, tracing each transition.
fn advance(phase: &mut SessionState, next: SessionState) {
    debug_assert!(
        phase.can_advance_to(next),
        "illegal session transition {} -> {}",
        phase.as_str(),
        next.as_str()
    );
    tracing::trace!(prev = phase.as_str(), next = next.as_str(), "session state");
    *phase = next;
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut phase = SessionState::Connecting;

    // Step 1: the first text frame must carry the credential.
    advance(&mut phase, SessionState::Authenticating);
    let first = time::timeout(
        Duration::from_secs(state.config.handshake_timeout_secs),
        read_first_text(&mut ws_rx),
    )
    .await;

    let first_frame = match first {
        Ok(Some(text)) => text,
        Ok(None) => {
            // Client went away before presenting a credential.
            advance(&mut phase, SessionState::Closed);
            return;
        }
        Err(_elapsed) => {
            advance(&mut phase, SessionState::Rejected);
            reject(&mut ws_tx, CLOSE_HANDSHAKE_TIMEOUT, "Authentication timed out").await;
            advance(&mut phase, SessionState::Closed);
            return;
        }
    };

    // Step 2: verify the credential and bind an identity.
    let Admission { session, history } = match handshake::authenticate(&state, &first_frame).await
    {
        Ok(admission) => admission,
        Err(err) => {
            advance(&mut phase, SessionState::Rejected);
            tracing::debug!(reason = err.message(), "handshake rejected");
            reject(&mut ws_tx, CLOSE_AUTH_FAILED, err.message()).await;
            advance(&mut phase, SessionState::Closed);
            return;
        }
    };
    advance(&mut phase, SessionState::Admitted);

    // Step 3: admit, replay history to this socket only, then announce.
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    state.registry.add(session.clone(), outbox_tx);

    if ws_tx.send(super::encode(&history)).await.is_err() {
        finish_session(&state, &session);
        advance(&mut phase, SessionState::Closed);
        return;
    }
    presence::notify_all(&state.registry);

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        username = %session.username,
        "session admitted"
    );

    // Step 4: the steady-state loop, until the socket goes away.
    run_session(&state, &session, ws_tx, ws_rx, outbox_rx).await;

    finish_session(&state, &session);
    advance(&mut phase, SessionState::Closed);

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "session closed"
    );
}

/// Read frames until the first text frame. `None` means the socket ended
/// without one.
async fn read_first_text(ws_rx: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during handshake");
                return None;
            }
        }
    }
    None
}

/// Main session loop: handle inbound frames and drain the outbox.
async fn run_session(
    state: &AppState,
    session: &Session,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut outbox_rx: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Chat { content }) => {
                                broadcast::handle_chat(state, session, &content).await;
                            }
                            Ok(ClientFrame::Auth { .. }) => {
                                // Already authenticated; repeats are ignored.
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    "ignoring auth frame after admission"
                                );
                            }
                            Err(err) => {
                                // Valid JSON with a type we don't handle is
                                // dropped; broken JSON gets an error reply.
                                // Neither tears the session down.
                                if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
                                    tracing::debug!(
                                        connection_id = %session.connection_id,
                                        "ignoring unhandled frame"
                                    );
                                    continue;
                                }
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    %err,
                                    "unparseable frame"
                                );
                                let reply = super::encode(&ServerFrame::error(PROCESSING_FAILED));
                                if ws_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(
                            connection_id = %session.connection_id,
                            ?e,
                            "ws read error"
                        );
                        break;
                    }
                    _ => continue,
                }
            }

            // A frame queued for this session by fan-out or presence.
            queued = outbox_rx.recv() => {
                match queued {
                    Some(message) => {
                        if ws_tx.send(message).await.is_err() {
                            // Write failure tears down this session only.
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Tear down a session exactly once: deregister, then tell everyone left.
///
/// Close and error can both surface for the same socket; the registry
/// removal reports whether this call was the first.
fn finish_session(state: &AppState, session: &Session) {
    if state.registry.remove(&session.connection_id) {
        presence::notify_all(&state.registry);
    }
}

/// Send a rejection: an error frame while the transport still allows one,
/// then a close frame with an application-level code.
async fn reject(ws_tx: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let _ = ws_tx.send(super::encode(&ServerFrame::error(reason))).await;
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    let _ = ws_tx.send(close).await;
}
