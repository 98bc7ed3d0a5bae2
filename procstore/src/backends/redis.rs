//! Redis document store
//!
//! Each document lives at `process_instance:<id>` as JSON text. Redis has no
//! triggers, so timestamps are client-side: `save` and `update` echo the
//! write time, reads carry none.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo};
use tracing::{debug, instrument, warn};

use crate::config::StoreOptions;
use crate::document::{ensure_id, parse_document, require_id, to_json_text, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "redis";

/// Key namespace for process instances.
pub const KEY_PREFIX: &str = "process_instance:";

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::store(BACKEND, e)
    }
}

/// Redis-based document store
pub struct RedisStore {
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Connect to the given URL, applying credential overrides from `options`.
    pub async fn connect(url: &str, options: &StoreOptions) -> Result<Self> {
        let mut info = url.into_connection_info()?;
        if let Some(username) = &options.username {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = &options.password {
            info.redis.password = Some(password.clone());
        }

        let client = redis::Client::open(info)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("connected to redis");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    fn make_key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn.read().clone().ok_or(Error::Closed { backend: BACKEND })
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;
        let body = to_json_text(BACKEND, &doc)?;
        let mut conn = self.connection()?;

        // NX keeps save an insert: an existing key is left untouched
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::make_key(&id))
            .arg(body)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(Error::AlreadyExists { backend: BACKEND, id });
        }

        let now = Utc::now();
        Ok(StoredRecord::new(id, doc).with_timestamps(Some(now), Some(now)))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let mut conn = self.connection()?;
        let body: Option<String> = conn.get(Self::make_key(id)).await?;

        body.map(|text| Ok(StoredRecord::new(id, parse_document(BACKEND, &text)?)))
            .transpose()
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;
        let body = to_json_text(BACKEND, &doc)?;
        let mut conn = self.connection()?;

        // XX refuses to create a key, so update never upserts
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::make_key(&id))
            .arg(body)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(Error::NotFound { backend: BACKEND, id });
        }

        Ok(StoredRecord::new(id, doc).with_timestamps(None, Some(Utc::now())))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        let mut conn = self.connection()?;
        conn.del::<_, ()>(Self::make_key(id)).await?;
        Ok(())
    }

    /// Walks every key under the namespace, so cost grows with the key count.
    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        let mut conn = self.connection()?;
        let keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let bodies: Vec<Option<String>> = conn.mget(&keys).await?;
        debug!(keys = keys.len(), "fetched process instances");

        let mut records = Vec::with_capacity(keys.len());
        for (key, body) in keys.iter().zip(bodies) {
            // removed between KEYS and MGET
            let Some(text) = body else {
                warn!(key = %key, "key vanished during list");
                continue;
            };
            let id = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
            records.push(StoredRecord::new(id, parse_document(BACKEND, &text)?));
        }
        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        self.conn.write().take();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
