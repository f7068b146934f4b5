//! The realtime core: handshake, session registry, fan-out, presence.

pub mod broadcast;
pub mod handshake;
pub mod presence;
pub mod registry;
pub mod server;
pub mod session;

use axum::extract::ws::Message;

use parley_common::ServerFrame;

/// Serialize a frame for the wire.
pub(crate) fn encode(frame: &ServerFrame) -> Message {
    // Our own frame types always serialize.
    Message::Text(serde_json::to_string(frame).unwrap().into())
}
