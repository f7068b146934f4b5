//! Message history over plain HTTP, for clients that poll instead of
//! holding a socket.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use parley_common::ChatMessage;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/messages", get(list_messages))
}

/// `GET /api/messages` — the same replay window the gateway pushes on
/// join: the most recent messages, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "Messages",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Recent messages, oldest first"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
)]
pub async fn list_messages(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let records = state.history.recent(state.config.history_limit).await?;
    Ok(Json(records.into_iter().map(ChatMessage::from).collect()))
}
