//! MongoDB document store.
//!
//! Documents live in the `process_instances` collection as
//! `{ _id, doc, created_at, updated_at }`, with the process document kept
//! whole in the `doc` field.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::StoreOptions;
use crate::document::{ensure_id, require_id, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "mongodb";

/// Collection holding process instances.
pub const COLLECTION: &str = "process_instances";

const DUPLICATE_KEY: i32 = 11000;

impl From<mongodb::error::Error> for Error {
    fn from(e: mongodb::error::Error) -> Self {
        Error::store(BACKEND, e)
    }
}

/// MongoDB document store.
pub struct MongoStore {
    client: RwLock<Option<Client>>,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect to the given URI and bind the `process_instances` collection
    /// in `options.database`.
    pub async fn connect(uri: &str, options: &StoreOptions) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let collection = client.database(&options.database).collection(COLLECTION);
        debug!(database = %options.database, "connected to mongodb");

        Ok(Self {
            client: RwLock::new(Some(client)),
            collection,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.client.read().is_some() {
            Ok(())
        } else {
            Err(Error::Closed { backend: BACKEND })
        }
    }
}

fn to_bson_document(doc: &ProcessDocument) -> Result<Document> {
    bson::to_document(doc).map_err(|e| Error::store(BACKEND, e))
}

fn timestamp(entry: &Document, field: &str) -> Option<DateTime<Utc>> {
    entry
        .get_datetime(field)
        .ok()
        .and_then(|t| DateTime::from_timestamp_millis(t.timestamp_millis()))
}

fn entry_to_record(entry: Document) -> Result<StoredRecord> {
    let id = entry
        .get_str("_id")
        .map_err(|e| Error::store(BACKEND, e))?
        .to_string();
    let body = entry
        .get_document("doc")
        .map_err(|e| Error::store(BACKEND, e))?
        .clone();

    let doc = match Bson::Document(body).into_relaxed_extjson() {
        Value::Object(map) => map,
        other => {
            return Err(Error::store(
                BACKEND,
                format!("stored document is not an object: {}", other),
            ))
        }
    };

    Ok(StoredRecord::new(id, doc)
        .with_timestamps(timestamp(&entry, "created_at"), timestamp(&entry, "updated_at")))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl DocumentStore for MongoStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;
        self.ensure_open()?;

        let body = to_bson_document(&doc)?;
        let now = bson::DateTime::now();
        let entry = doc! {
            "_id": id.as_str(),
            "doc": body,
            "created_at": now,
            "updated_at": now,
        };

        self.collection.insert_one(entry).await.map_err(|e| {
            if is_duplicate_key(&e) {
                Error::AlreadyExists { backend: BACKEND, id: id.clone() }
            } else {
                e.into()
            }
        })?;

        let now = DateTime::from_timestamp_millis(now.timestamp_millis());
        Ok(StoredRecord::new(id, doc).with_timestamps(now, now))
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        self.ensure_open()?;
        let entry = self.collection.find_one(doc! { "_id": id }).await?;
        entry.map(entry_to_record).transpose()
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;
        self.ensure_open()?;

        let body = to_bson_document(&doc)?;
        let change = doc! {
            "$set": {
                "doc": body,
                "updated_at": bson::DateTime::now(),
            }
        };
        let entry = self
            .collection
            .find_one_and_update(doc! { "_id": id.as_str() }, change)
            .return_document(ReturnDocument::After)
            .await?;

        match entry {
            Some(entry) => entry_to_record(entry),
            None => Err(Error::NotFound { backend: BACKEND, id }),
        }
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        debug!(id = %id, deleted = result.deleted_count, "removed process instance");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        self.ensure_open()?;
        let entries: Vec<Document> = self.collection.find(doc! {}).await?.try_collect().await?;
        entries.into_iter().map(entry_to_record).collect()
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.write().take();
        if let Some(client) = client {
            client.shutdown().immediate(true).await;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
