//! Presence-count propagation.

use parley_common::ServerFrame;

use super::registry::ConnectionRegistry;

/// Push the current session count to every admitted session.
///
/// Called after every registry mutation. The count is read once per call,
/// so all recipients of one notification see the same number even while
/// joins and leaves race.
pub fn notify_all(registry: &ConnectionRegistry) {
    let count = registry.len();
    registry.broadcast(super::encode(&ServerFrame::UserCount { count }));
    tracing::debug!(count, "presence update");
}
