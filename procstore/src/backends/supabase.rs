//! Supabase document store
//!
//! Talks to the project's PostgREST endpoint. The table layout matches the
//! PostgreSQL backend (`id`, `doc` JSONB, trigger-maintained timestamps).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

use crate::config::SupabaseOptions;
use crate::document::{ensure_id, require_id, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "supabase";

/// Table holding process instances.
pub const TABLE: &str = "process_instances";

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::store(BACKEND, e)
    }
}

#[derive(Serialize)]
struct InsertRow<'a> {
    id: &'a str,
    doc: &'a ProcessDocument,
}

#[derive(Serialize)]
struct PatchRow<'a> {
    doc: &'a ProcessDocument,
}

#[derive(Deserialize)]
struct Row {
    id: String,
    doc: ProcessDocument,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<Row> for StoredRecord {
    fn from(row: Row) -> Self {
        StoredRecord::new(row.id, row.doc).with_timestamps(row.created_at, row.updated_at)
    }
}

/// Supabase (PostgREST) document store.
pub struct SupabaseStore {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    closed: AtomicBool,
}

impl SupabaseStore {
    /// Create a store for the project at `host`.
    ///
    /// `options.project_url` wins over `https://<host>`. The API key is not
    /// checked here; the service rejects calls made without one.
    pub fn new(host: &str, options: &SupabaseOptions) -> Result<Self> {
        let base = match &options.project_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", host),
        };
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", base, TABLE),
            api_key: options.api_key.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the table endpoint this store talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method) -> Result<RequestBuilder> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed { backend: BACKEND });
        }
        let builder = self.client.request(method, &self.endpoint);
        Ok(match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        })
    }

    async fn rows(response: Response) -> Result<Vec<Row>> {
        let response = response.error_for_status()?;
        Ok(response.json::<Vec<Row>>().await?)
    }
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", id))]
}

#[async_trait]
impl DocumentStore for SupabaseStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;

        let response = self
            .request(reqwest::Method::POST)?
            .header("Prefer", "return=representation")
            .json(&InsertRow { id: &id, doc: &doc })
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(Error::AlreadyExists { backend: BACKEND, id });
        }

        let row = Self::rows(response).await?.into_iter().next();
        Ok(match row {
            Some(row) => row.into(),
            None => StoredRecord::new(id, doc),
        })
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let response = self
            .request(reqwest::Method::GET)?
            .query(&[("select", "*")])
            .query(&id_filter(id))
            .send()
            .await?;

        Ok(Self::rows(response).await?.into_iter().next().map(Into::into))
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;

        let response = self
            .request(reqwest::Method::PATCH)?
            .query(&id_filter(&id))
            .header("Prefer", "return=representation")
            .json(&PatchRow { doc: &doc })
            .send()
            .await?;

        match Self::rows(response).await?.into_iter().next() {
            Some(row) => Ok(row.into()),
            None => Err(Error::NotFound { backend: BACKEND, id }),
        }
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn remove(&self, id: &str) -> Result<()> {
        self.request(reqwest::Method::DELETE)?
            .query(&id_filter(id))
            .send()
            .await?
            .error_for_status()?;
        debug!(id = %id, "removed process instance");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = BACKEND))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        let response = self
            .request(reqwest::Method::GET)?
            .query(&[("select", "*")])
            .send()
            .await?;

        Ok(Self::rows(response).await?.into_iter().map(Into::into).collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
