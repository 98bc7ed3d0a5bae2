//! PostgreSQL document store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS process_instances (
//!     id         TEXT PRIMARY KEY,
//!     doc        JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! A `BEFORE UPDATE` trigger keeps `updated_at` fresh, so every writer
//! (including ones outside this crate) gets the same behaviour.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::config::StoreOptions;
use crate::document::{ensure_id, require_id, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "postgres";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS process_instances (
    id         TEXT PRIMARY KEY,
    doc        JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE OR REPLACE FUNCTION process_instances_touch() RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS process_instances_touch ON process_instances;
CREATE TRIGGER process_instances_touch
    BEFORE UPDATE ON process_instances
    FOR EACH ROW EXECUTE FUNCTION process_instances_touch();
"#;

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => Error::Closed { backend: BACKEND },
            other => Error::store(BACKEND, other),
        }
    }
}

/// PostgreSQL document store over a `sqlx` pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to the given URL and bootstrap the schema.
    ///
    /// Username/password in `options` override those in the URL.
    pub async fn connect(url: &str, options: &StoreOptions) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(url)?;
        if let Some(username) = &options.username {
            connect_options = connect_options.username(username);
        }
        if let Some(password) = &options.password {
            connect_options = connect_options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect_options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!("process_instances schema ready");
        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: &PgRow) -> Result<StoredRecord> {
    let id: String = row.try_get("id")?;
    let Json(doc): Json<ProcessDocument> = row.try_get("doc")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(StoredRecord::new(id, doc).with_timestamps(Some(created_at), Some(updated_at)))
}

#[async_trait]
impl DocumentStore for PostgresStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;

        let row = sqlx::query(
            r#"
            INSERT INTO process_instances (id, doc) VALUES ($1, $2)
            RETURNING id, doc, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(Json(&doc))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                Error::AlreadyExists {
                    backend: BACKEND,
                    id: id.clone(),
                }
            } else {
                e.into()
            }
        })?;

        row_to_record(&row)
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            "SELECT id, doc, created_at, updated_at FROM process_instances WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;

        let row = sqlx::query(
            r#"
            UPDATE process_instances SET doc = $2 WHERE id = $1
            RETURNING id, doc, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(Json(&doc))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(Error::NotFound { backend: BACKEND, id }),
        }
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM process_instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(id = %id, deleted = result.rows_affected(), "removed process instance");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, doc, created_at, updated_at FROM process_instances ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
