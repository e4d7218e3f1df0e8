use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use humanscore_schema::{SessionMeta, SessionRecord, StepEvent};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::migrations::run_migrations;
use crate::{Result, SessionStore, StoreError};

/// SQLite-backed store. Steps and meta are kept as JSON columns; every
/// `update` replaces the row wholesale.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Backend("failed to lock sqlite connection".into()))?;
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            Ok::<usize, StoreError>(n as usize)
        })
        .await?
    }
}

struct RawRow {
    id: String,
    steps: String,
    meta: String,
    steps_completed: i64,
    created_at: String,
}

fn decode_row(raw: RawRow) -> Result<SessionRecord> {
    let steps: Vec<StepEvent> = serde_json::from_str(&raw.steps)?;
    let meta: SessionMeta = serde_json::from_str(&raw.meta)?;
    let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("bad created_at for {}: {e}", raw.id)))?;
    Ok(SessionRecord {
        id: raw.id,
        steps,
        meta,
        steps_completed: raw.steps_completed.max(0) as u32,
        created_at,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let db = Arc::clone(&self.db);
        let session_id = session_id.to_owned();
        let raw = task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Backend("failed to lock sqlite connection".into()))?;
            let row = conn
                .query_row(
                    r#"
                    SELECT id, steps, meta, steps_completed, created_at
                    FROM sessions
                    WHERE id = ?1
                    "#,
                    params![session_id],
                    |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            steps: row.get(1)?,
                            meta: row.get(2)?,
                            steps_completed: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok::<Option<RawRow>, StoreError>(row)
        })
        .await??;

        raw.map(decode_row).transpose()
    }

    async fn update(&self, session_id: &str, record: &SessionRecord) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = session_id.to_owned();
        let steps = serde_json::to_string(&record.steps)?;
        let meta = serde_json::to_string(&record.meta)?;
        let steps_completed = i64::from(record.steps_completed);
        let created_at = record.created_at.to_rfc3339();
        let updated_at = Utc::now().to_rfc3339();

        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Backend("failed to lock sqlite connection".into()))?;
            conn.execute(
                r#"
                INSERT INTO sessions (id, steps, meta, steps_completed, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    steps = excluded.steps,
                    meta = excluded.meta,
                    steps_completed = excluded.steps_completed,
                    updated_at = excluded.updated_at
                "#,
                params![id, steps, meta, steps_completed, created_at, updated_at],
            )?;
            Ok::<(), StoreError>(())
        })
        .await??;

        tracing::debug!(
            session_id,
            steps = record.steps.len(),
            "session record written"
        );
        Ok(())
    }
}
