//! Uniform persistence for process-instance documents.
//!
//! A [`ProcessStore`] inspects the scheme of a connection URI once, binds
//! exactly one [`DocumentStore`] adapter and forwards every call to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ProcessStore                        │
//! │        persist / load / load_all / update / remove       │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │  Box<dyn DocumentStore>
//!       ┌──────────┬───────────┼───────────┬──────────┐
//!       ▼          ▼           ▼           ▼          ▼
//!  ┌─────────┐ ┌────────┐ ┌──────────┐ ┌─────────┐ ┌──────────┐
//!  │ MongoDB │ │Postgres│ │  Redis   │ │  File   │ │ Supabase │
//!  └─────────┘ └────────┘ └──────────┘ └─────────┘ └──────────┘
//! ```
//!
//! # Schemes
//!
//! | URI                                    | Backend            |
//! |----------------------------------------|--------------------|
//! | `mongodb://`, `mongodb+srv://`         | [`MongoStore`]     |
//! | `postgres://`, `postgresql://`         | [`PostgresStore`]  |
//! | `redis://`, `rediss://`                | [`RedisStore`]     |
//! | `supabase://<project host>`            | [`SupabaseStore`]  |
//! | `sqlite://<path>`, `sqlite::memory:`   | [`SqliteStore`]    |
//! | `memory://`                            | [`MemoryStore`]    |
//! | `file://<path>` or anything else       | [`FileStore`]      |
//!
//! An unrecognised scheme is not an error: the whole URI becomes a file
//! path. Set [`StoreOptions::strict_scheme`] to reject it instead.
//!
//! # Quick Start
//!
//! ```no_run
//! use procstore::{ProcessStore, StoreOptions};
//! use serde_json::json;
//!
//! # async fn example() -> procstore::Result<()> {
//! let store = ProcessStore::connect(StoreOptions::new("redis://localhost:6379")).await?;
//!
//! let doc = json!({"name": "order-1"}).as_object().cloned().unwrap();
//! let saved = store.persist(doc).await?;
//!
//! let loaded = store.load(&saved.id).await?;
//! assert_eq!(loaded.map(|r| r.doc), Some(saved.doc));
//!
//! store.remove(&saved.id).await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `redis` - Redis key-value backend
//! - `postgres` - PostgreSQL backend (`sqlx`)
//! - `mongodb` - MongoDB backend
//! - `supabase` - Supabase PostgREST backend (`reqwest`)
//!
//! All four are on by default. File, SQLite and memory backends are always
//! available.

pub mod backends;
pub mod config;
mod document;
mod error;
mod facade;
pub mod logging;
mod scheme;
mod traits;

pub use backends::{create_store, FileStore, MemoryStore, SqliteStore};
pub use config::{Config, LoggingConfig, StoreOptions, SupabaseOptions};
pub use document::{document_id, ensure_id, require_id, ProcessDocument, StoredRecord, ID_FIELD};
pub use error::{BoxError, Error, Result};
pub use facade::ProcessStore;
pub use scheme::BackendKind;
pub use traits::DocumentStore;

#[cfg(feature = "mongodb")]
pub use backends::MongoStore;
#[cfg(feature = "postgres")]
pub use backends::PostgresStore;
#[cfg(feature = "redis")]
pub use backends::RedisStore;
#[cfg(feature = "supabase")]
pub use backends::SupabaseStore;

/// Connect a [`ProcessStore`] for the given URI with default options.
pub async fn connect(uri: impl Into<String>) -> Result<ProcessStore> {
    ProcessStore::connect(StoreOptions::new(uri)).await
}
