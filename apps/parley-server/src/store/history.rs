//! Append-only chat history.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use parley_common::ChatMessage;

use crate::error::StoreError;

/// How many messages the in-memory store retains before evicting the oldest.
const MEMORY_CAP: usize = 1000;

/// A persisted chat message, including the author linkage the wire
/// format does not carry.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: i64,
    pub author_id: String,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        ChatMessage {
            id: record.id,
            username: record.username,
            content: record.content,
            timestamp: record.created_at,
        }
    }
}

/// Abstraction over message persistence.
///
/// Ids and timestamps are assigned by the store, never by callers, so the
/// replay order is the append order.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message and return the stored record.
    async fn append(
        &self,
        author_id: &str,
        username: &str,
        content: &str,
    ) -> Result<MessageRecord, StoreError>;

    /// The most recent `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<MessageRecord>, StoreError>;
}

struct HistoryInner {
    messages: VecDeque<MessageRecord>,
    next_id: i64,
}

/// In-memory history store with a bounded buffer.
pub struct MemoryHistoryStore {
    inner: Mutex<HistoryInner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                messages: VecDeque::new(),
                next_id: 1,
            }),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(
        &self,
        author_id: &str,
        username: &str,
        content: &str,
    ) -> Result<MessageRecord, StoreError> {
        // Id assignment and insertion happen under one lock so ids and
        // timestamps are monotone in buffer order.
        let mut inner = self.inner.lock();
        let record = MessageRecord {
            id: inner.next_id,
            author_id: author_id.to_string(),
            username: username.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.next_id += 1;
        inner.messages.push_back(record.clone());
        while inner.messages.len() > MEMORY_CAP {
            inner.messages.pop_front();
        }
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.lock();
        let skip = inner.messages.len().saturating_sub(limit);
        Ok(inner.messages.iter().skip(skip).cloned().collect())
    }
}
