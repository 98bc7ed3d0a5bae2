//! SQLite document store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::document::{ensure_id, parse_document, require_id, to_json_text, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "sqlite";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS process_instances (
        id         TEXT PRIMARY KEY,
        doc        TEXT NOT NULL CHECK (json_valid(doc)),
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
"#;

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::store(BACKEND, e)
    }
}

/// SQLite-based document store
///
/// One `process_instances` table keyed by id. Timestamps come from SQLite's
/// own clock.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::store(BACKEND, e))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // WAL mode + performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }
}

fn timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::store(BACKEND, e))
}

/// Raw column values of one row, converted after the statement finishes.
struct RawRow {
    id: String,
    doc: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            doc: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<StoredRecord> {
        let doc = parse_document(BACKEND, &self.doc)?;
        Ok(StoredRecord::new(self.id, doc).with_timestamps(
            Some(timestamp(&self.created_at)?),
            Some(timestamp(&self.updated_at)?),
        ))
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl DocumentStore for SqliteStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;
        let body = to_json_text(BACKEND, &doc)?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed { backend: BACKEND })?;

        let row = conn
            .query_row(
                r#"
                INSERT INTO process_instances (id, doc) VALUES (?1, ?2)
                RETURNING id, doc, created_at, updated_at
                "#,
                params![&id, &body],
                RawRow::from_row,
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::AlreadyExists { backend: BACKEND, id: id.clone() }
                } else {
                    e.into()
                }
            })?;

        debug!(id = %id, "saved process instance");
        row.into_record()
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed { backend: BACKEND })?;

        let row = conn
            .query_row(
                "SELECT id, doc, created_at, updated_at FROM process_instances WHERE id = ?1",
                params![id],
                RawRow::from_row,
            )
            .optional()?;

        row.map(RawRow::into_record).transpose()
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;
        let body = to_json_text(BACKEND, &doc)?;
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed { backend: BACKEND })?;

        let row = conn
            .query_row(
                r#"
                UPDATE process_instances
                SET doc = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                WHERE id = ?2
                RETURNING id, doc, created_at, updated_at
                "#,
                params![&body, &id],
                RawRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => row.into_record(),
            None => Err(Error::NotFound { backend: BACKEND, id }),
        }
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed { backend: BACKEND })?;

        let deleted = conn.execute("DELETE FROM process_instances WHERE id = ?1", params![id])?;
        debug!(id = %id, deleted, "removed process instance");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed { backend: BACKEND })?;

        let mut stmt = conn.prepare(
            "SELECT id, doc, created_at, updated_at FROM process_instances ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawRow::into_record).collect()
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.close().map_err(|(_, e)| Error::from(e))?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
