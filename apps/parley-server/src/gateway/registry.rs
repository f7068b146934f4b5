//! Registry of admitted sessions, the unit of fan-out and presence.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::session::Session;

/// Write half of a session's outbox. Frames queued here are drained onto
/// the socket by the owning connection task, so registry callers never
/// block on a slow peer.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// A session as the registry holds it: verified identity plus outbox.
pub struct RegisteredSession {
    pub session: Session,
    pub outbox: Outbox,
}

/// All currently admitted sessions, keyed by connection id.
///
/// Entries are inserted on admission and removed exactly once on teardown;
/// everything else works from snapshots.
pub struct ConnectionRegistry {
    sessions: DashMap<String, RegisteredSession>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Admit a session.
    pub fn add(&self, session: Session, outbox: Outbox) {
        let connection_id = session.connection_id.clone();
        self.sessions
            .insert(connection_id, RegisteredSession { session, outbox });
    }

    /// Remove a session. Returns `false` when the connection id was already
    /// gone, so teardown side effects can be skipped on the second call.
    pub fn remove(&self, connection_id: &str) -> bool {
        self.sessions.remove(connection_id).is_some()
    }

    /// Number of currently admitted sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Copy of the current membership. Taken up front by fan-out so
    /// concurrent admissions and removals cannot disturb iteration.
    pub fn snapshot(&self) -> Vec<(String, Outbox)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().outbox.clone()))
            .collect()
    }

    /// Queue a frame on every admitted session's outbox.
    ///
    /// A failed send means that session's task already quit; the frame is
    /// dropped for that recipient and delivery to the rest continues.
    pub fn broadcast(&self, message: Message) {
        for (connection_id, outbox) in self.snapshot() {
            if outbox.send(message.clone()).is_err() {
                tracing::debug!(%connection_id, "dropping frame for closing session");
            }
        }
    }

    /// Queue a frame for a single session. Returns `false` if the session
    /// is gone or closing.
    pub fn send_to(&self, connection_id: &str, message: Message) -> bool {
        match self.sessions.get(connection_id) {
            Some(entry) => entry.outbox.send(message).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::Session;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn admit(registry: &ConnectionRegistry, username: &str) -> (String, UnboundedReceiver<Message>) {
        let session = Session::new(format!("usr_{username}"), username.to_string());
        let connection_id = session.connection_id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.add(session, tx);
        (connection_id, rx)
    }

    fn text(content: &str) -> Message {
        Message::Text(content.to_string().into())
    }

    #[test]
    fn add_and_remove_drive_len() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        let (id_a, _rx_a) = admit(&registry, "alice");
        let (_id_b, _rx_b) = admit(&registry, "bob");
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&id_a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_remove_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = admit(&registry, "alice");

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(!registry.remove("conn_never_existed"));
    }

    #[test]
    fn broadcast_reaches_every_outbox() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = admit(&registry, "alice");
        let (_b, mut rx_b) = admit(&registry, "bob");

        registry.broadcast(text("hello"));

        assert_eq!(rx_a.try_recv().unwrap(), text("hello"));
        assert_eq!(rx_b.try_recv().unwrap(), text("hello"));
    }

    #[test]
    fn broadcast_survives_a_dead_outbox() {
        let registry = ConnectionRegistry::new();
        let (_a, rx_a) = admit(&registry, "alice");
        let (_b, mut rx_b) = admit(&registry, "bob");

        // Alice's connection task is gone but her entry lingers.
        drop(rx_a);
        registry.broadcast(text("hello"));

        assert_eq!(rx_b.try_recv().unwrap(), text("hello"));
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let registry = ConnectionRegistry::new();
        let (_a, _rx_a) = admit(&registry, "alice");

        let snapshot = registry.snapshot();
        let (_b, _rx_b) = admit(&registry, "bob");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn send_to_targets_one_session() {
        let registry = ConnectionRegistry::new();
        let (id_a, mut rx_a) = admit(&registry, "alice");
        let (_b, mut rx_b) = admit(&registry, "bob");

        assert!(registry.send_to(&id_a, text("just you")));
        assert_eq!(rx_a.try_recv().unwrap(), text("just you"));
        assert!(rx_b.try_recv().is_err());

        assert!(!registry.send_to("conn_unknown", text("nobody")));
    }
}
