use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use parley_server::config::Config;
use parley_server::error::StoreError;
use parley_server::gateway::registry::ConnectionRegistry;
use parley_server::store::history::{HistoryStore, MemoryHistoryStore, MessageRecord};
use parley_server::store::users::MemoryUserStore;
use parley_server::AppState;

/// Config pointed at nothing external. The handshake window is short so
/// timeout tests stay fast.
pub fn test_config() -> Config {
    Config {
        jwt_secret: "test-secret-not-for-production".to_string(),
        port: 0,
        history_limit: 50,
        handshake_timeout_secs: 2,
        token_ttl_hours: 24,
    }
}

pub fn test_state() -> AppState {
    state_with_history(Arc::new(MemoryHistoryStore::new()))
}

pub fn state_with_history(history: Arc<dyn HistoryStore>) -> AppState {
    AppState {
        config: Arc::new(test_config()),
        users: Arc::new(MemoryUserStore::new()),
        history,
        registry: Arc::new(ConnectionRegistry::new()),
    }
}

/// Build the full router plus the state behind it.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = parley_server::routes::router().with_state(state.clone());
    (app, state)
}

/// Mint a valid session token without going through the HTTP API.
pub fn mint_token(state: &AppState, username: &str) -> String {
    let user_id = parley_common::id::prefixed_ulid(parley_common::id::prefix::USER);
    parley_server::auth::tokens::issue_token(
        &user_id,
        username,
        &state.config.jwt_secret,
        chrono::Duration::hours(1),
    )
    .expect("mint token")
}

/// Seed `count` messages straight into the history store.
pub async fn seed_history(state: &AppState, count: usize) {
    for i in 1..=count {
        state
            .history
            .append("usr_seed", "seeder", &format!("seeded {i}"))
            .await
            .expect("seed message");
    }
}

/// History store whose writes can be switched off, for testing the
/// persistence-failure path. Reads always work so handshakes stay healthy.
pub struct FlakyHistoryStore {
    inner: MemoryHistoryStore,
    fail_writes: AtomicBool,
}

impl FlakyHistoryStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryHistoryStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistoryStore for FlakyHistoryStore {
    async fn append(
        &self,
        author_id: &str,
        username: &str,
        content: &str,
    ) -> Result<MessageRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        self.inner.append(author_id, username, content).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
        self.inner.recent(limit).await
    }
}
