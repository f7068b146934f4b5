//! First-frame authentication and history replay assembly.

use parley_common::{ChatMessage, ClientFrame, ServerFrame};

use crate::auth::tokens::{self, AuthError};
use crate::AppState;

use super::session::Session;

/// Outcome of a successful handshake: the session to admit plus the
/// history frame replayed to the joining socket only.
#[derive(Debug)]
pub struct Admission {
    pub session: Session,
    pub history: ServerFrame,
}

/// Validate a connection's first frame and assemble its replay payload.
///
/// The only credential transport is the post-connect `{"type":"auth"}`
/// frame; a first frame of any other shape counts as a missing credential.
pub async fn authenticate(state: &AppState, first_frame: &str) -> Result<Admission, AuthError> {
    let token = match serde_json::from_str::<ClientFrame>(first_frame) {
        Ok(ClientFrame::Auth { token }) => token,
        _ => return Err(AuthError::Missing),
    };

    let identity = tokens::verify_token(&token, &state.config.jwt_secret)?;

    // Load the replay window before the session joins the registry, so a
    // message fanned out mid-join is never delivered twice.
    let messages: Vec<ChatMessage> = match state.history.recent(state.config.history_limit).await {
        Ok(records) => records.into_iter().map(ChatMessage::from).collect(),
        Err(err) => {
            tracing::warn!(%err, "history unavailable, admitting with empty replay");
            Vec::new()
        }
    };

    let session = Session::new(identity.user_id, identity.username);
    Ok(Admission {
        session,
        history: ServerFrame::History { messages },
    })
}
