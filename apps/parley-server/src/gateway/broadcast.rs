//! Inbound chat handling: validate, persist, then fan out.

use parley_common::ServerFrame;

use crate::AppState;

use super::session::Session;

/// Error message sent to a sender whose message could not be handled. The
/// session itself stays admitted.
pub const PROCESSING_FAILED: &str = "Failed to process message";

/// Handle one chat send from an admitted session.
///
/// The append must complete before any fan-out starts, so every session
/// sees messages only after they are durable. On append failure the sender
/// alone gets an error frame and nothing is broadcast.
pub async fn handle_chat(state: &AppState, session: &Session, content: &str) {
    let content = content.trim();
    if content.is_empty() {
        // Whitespace-only sends are dropped without a reply.
        return;
    }

    match state
        .history
        .append(&session.user_id, &session.username, content)
        .await
    {
        Ok(record) => {
            let message_id = record.id;
            state
                .registry
                .broadcast(super::encode(&ServerFrame::chat(record.into())));
            tracing::debug!(
                connection_id = %session.connection_id,
                message_id,
                "message fanned out"
            );
        }
        Err(err) => {
            tracing::error!(
                connection_id = %session.connection_id,
                user_id = %session.user_id,
                %err,
                "failed to persist message"
            );
            state.registry.send_to(
                &session.connection_id,
                super::encode(&ServerFrame::error(PROCESSING_FAILED)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use crate::config::Config;
    use crate::error::StoreError;
    use crate::gateway::registry::ConnectionRegistry;
    use crate::store::history::{HistoryStore, MemoryHistoryStore, MessageRecord};
    use crate::store::users::MemoryUserStore;

    use super::*;

    /// History store that refuses every append.
    struct BrokenHistoryStore;

    #[async_trait]
    impl HistoryStore for BrokenHistoryStore {
        async fn append(
            &self,
            _author_id: &str,
            _username: &str,
            _content: &str,
        ) -> Result<MessageRecord, StoreError> {
            Err(StoreError::Unavailable("append refused".to_string()))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn state_with(history: Arc<dyn HistoryStore>) -> AppState {
        AppState {
            config: Arc::new(Config {
                jwt_secret: "broadcast-test-secret".to_string(),
                port: 0,
                history_limit: 50,
                handshake_timeout_secs: 10,
                token_ttl_hours: 24,
            }),
            users: Arc::new(MemoryUserStore::new()),
            history,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    fn admit(state: &AppState, username: &str) -> (Session, UnboundedReceiver<Message>) {
        let session = Session::new(format!("usr_{username}"), username.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        state.registry.add(session.clone(), tx);
        (session, rx)
    }

    fn parse(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_is_persisted_then_fanned_out_to_everyone() {
        let state = state_with(Arc::new(MemoryHistoryStore::new()));
        let (alice, mut rx_alice) = admit(&state, "alice");
        let (_bob, mut rx_bob) = admit(&state, "bob");

        handle_chat(&state, &alice, "hello there").await;

        let frame_a = parse(rx_alice.try_recv().unwrap());
        let frame_b = parse(rx_bob.try_recv().unwrap());
        assert_eq!(frame_a, frame_b);
        assert_eq!(frame_a["type"], "chat");
        assert_eq!(frame_a["username"], "alice");
        assert_eq!(frame_a["content"], "hello there");
        assert_eq!(frame_a["id"], 1);

        let stored = state.history.recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].author_id, alice.user_id);
    }

    #[tokio::test]
    async fn whitespace_only_send_is_dropped() {
        let state = state_with(Arc::new(MemoryHistoryStore::new()));
        let (alice, mut rx_alice) = admit(&state, "alice");

        handle_chat(&state, &alice, "   \t  ").await;

        assert!(rx_alice.try_recv().is_err());
        assert!(state.history.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_is_trimmed_before_persisting() {
        let state = state_with(Arc::new(MemoryHistoryStore::new()));
        let (alice, _rx) = admit(&state, "alice");

        handle_chat(&state, &alice, "  hi  ").await;

        let stored = state.history.recent(10).await.unwrap();
        assert_eq!(stored[0].content, "hi");
    }

    #[tokio::test]
    async fn append_failure_errors_the_sender_only() {
        let state = state_with(Arc::new(BrokenHistoryStore));
        let (alice, mut rx_alice) = admit(&state, "alice");
        let (_bob, mut rx_bob) = admit(&state, "bob");

        handle_chat(&state, &alice, "doomed").await;

        let frame = parse(rx_alice.try_recv().unwrap());
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], PROCESSING_FAILED);
        assert!(rx_bob.try_recv().is_err());
    }
}
