//! Session persistence: the store a flush reads from and writes back to.

pub mod memory;
pub mod migrations;
pub mod sqlite;

use async_trait::async_trait;
use humanscore_schema::SessionRecord;
use thiserror::Error;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session store backend error: {0}")]
    Backend(String),

    #[error("session record is not valid json: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Backend(format!("store task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when the session has never been written.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Replaces the stored record for `session_id`.
    async fn update(&self, session_id: &str, record: &SessionRecord) -> Result<()>;

    /// Like `get`, but a missing session is an error.
    async fn require(&self, session_id: &str) -> Result<SessionRecord> {
        self.get(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }
}
