//! In-memory document store.
//!
//! Keeps records in a HashMap until the adapter is closed. Useful for
//! tests and for embedding the facade where durability is not needed.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

use crate::document::{ensure_id, require_id, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "memory";

/// Process-local document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, StoredRecord>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed { backend: BACKEND });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;
        self.ensure_open()?;
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(Error::AlreadyExists { backend: BACKEND, id });
        }

        let now = Utc::now();
        let record = StoredRecord::new(id.clone(), doc).with_timestamps(Some(now), Some(now));
        records.insert(id.clone(), record.clone());
        debug!(id = %id, "saved process instance");
        Ok(record)
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().get(id).cloned())
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;
        self.ensure_open()?;
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound { backend: BACKEND, id: id.clone() })?;

        record.doc = doc;
        record.updated_at = Some(Utc::now());
        debug!(id = %id, "updated process instance");
        Ok(record.clone())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        self.records.write().remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredRecord>> {
        self.ensure_open()?;
        Ok(self.records.read().values().cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.records.write().clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
