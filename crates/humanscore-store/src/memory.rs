use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use humanscore_schema::SessionRecord;
use tokio::sync::RwLock;

use crate::{Result, SessionStore};

/// Process-local store, used by tests and `--store memory`.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn update(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(session_id.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemorySessionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(matches!(
            store.require("nope").await,
            Err(StoreError::NotFound(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn update_then_get_roundtrips() {
        let store = InMemorySessionStore::new();
        let record = SessionRecord::new("s1");
        store.update("s1", &record).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Some(record));
        assert_eq!(store.len().await, 1);
    }
}
