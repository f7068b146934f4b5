//! Per-connection identity and lifecycle.

use chrono::{DateTime, Utc};

use parley_common::id;

/// The lifecycle of one socket, from accept to teardown.
///
/// Normal path: `Connecting → Authenticating → Admitted → Closed`. A failed
/// handshake goes `Authenticating → Rejected → Closed` instead. A socket
/// that drops at any point goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Admitted,
    Rejected,
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Admitted)
                | (Authenticating, Rejected)
                | (Connecting, Closed)
                | (Authenticating, Closed)
                | (Admitted, Closed)
                | (Rejected, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Admitted => "admitted",
            SessionState::Rejected => "rejected",
            SessionState::Closed => "closed",
        }
    }
}

/// A live connection bound to a verified identity.
///
/// Constructed only after credential verification succeeds; the identity
/// fields never change for the lifetime of the socket. A reconnecting
/// client gets a brand-new `connection_id`.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: String,
    pub user_id: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: String, username: String) -> Self {
        Self {
            connection_id: id::prefixed_ulid(id::prefix::CONNECTION),
            user_id,
            username,
            joined_at: Utc::now(),
        }
    }
}
