//! Wire-format frames exchanged over the chat WebSocket.
//!
//! Every frame is a single JSON object tagged by its `"type"` field. The
//! same types are used by the server (serialize outbound, deserialize
//! inbound) and the client (the reverse), so the two ends cannot drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat message payload
// ---------------------------------------------------------------------------

/// A chat message as it appears on the wire: in `history` replays and in
/// `chat` broadcasts. `id` and `timestamp` are always server-assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A frame received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Handshake credential. Must be the first frame on a new connection.
    Auth { token: String },
    /// A chat send. Serialized as `"message"`; `"chat"` is accepted as an
    /// alias since both tags appear in deployed clients.
    #[serde(rename = "message", alias = "chat")]
    Chat { content: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A frame pushed from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// One-time history replay sent to a freshly admitted session.
    /// Messages are ordered oldest-first.
    History { messages: Vec<ChatMessage> },
    /// A broadcast chat message (senders receive their own).
    Chat {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// Server status text rendered inline with the chat.
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Live count of admitted sessions, pushed on every join/leave.
    UserCount { count: usize },
    /// Handshake or send failure report.
    Error { message: String },
}

impl ServerFrame {
    /// Build a `chat` broadcast frame.
    pub fn chat(message: ChatMessage) -> Self {
        Self::Chat { message }
    }

    /// Build a `system` frame stamped with the current time.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
