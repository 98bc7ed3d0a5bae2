//! The CRUD contract every backend adapter implements.

use async_trait::async_trait;

use crate::document::{ProcessDocument, StoredRecord};
use crate::error::Result;

/// Uniform document store over one concrete storage technology.
///
/// Every call is a single logical operation against the store; retries and
/// timeouts are left to the caller and the client library.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one adapter can serve
/// concurrent callers. Ordering between concurrent calls is whatever the
/// underlying store provides.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document.
    ///
    /// Assigns a UUID v4 id if the document has none and persists the full
    /// document, id included, in one insert.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyExists` if the id is already stored, `Error::Store` for
    /// any other write failure.
    async fn save(&self, doc: ProcessDocument) -> Result<StoredRecord>;

    /// Fetch a document by exact id. `Ok(None)` when nothing is stored under it.
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>>;

    /// Replace the stored body of an existing document wholesale.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if `doc` has no id (raised before any I/O),
    /// `Error::NotFound` if the id is not stored.
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord>;

    /// Delete a document. No-op if the id is not stored (idempotent).
    async fn remove(&self, id: &str) -> Result<()>;

    /// Return every stored record.
    ///
    /// Order follows the backend's natural retrieval order. No pagination.
    async fn list(&self) -> Result<Vec<StoredRecord>>;

    /// Release the connection or pool held by this adapter.
    async fn close(&self) -> Result<()>;

    /// Get a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;
}
