//! The single entry point that binds one backend adapter.

use tracing::{info, warn};

use crate::backends::create_store;
use crate::config::StoreOptions;
use crate::document::{ProcessDocument, StoredRecord};
use crate::error::Result;
use crate::scheme::BackendKind;
use crate::traits::DocumentStore;

/// Persistence facade for process-instance documents.
///
/// The backend is chosen once, from the URI scheme, when the facade is
/// built; every call afterwards goes straight to that adapter.
pub struct ProcessStore {
    store: Box<dyn DocumentStore>,
}

impl std::fmt::Debug for ProcessStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessStore")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl ProcessStore {
    /// Select and connect the backend named by `options.uri`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` when no URI is given (or, with
    /// `strict_scheme`, when its scheme is unknown). Connection failures of
    /// network backends surface as store errors.
    pub async fn connect(options: StoreOptions) -> Result<Self> {
        let uri = options.require_uri()?;
        let kind = if options.strict_scheme {
            BackendKind::from_uri_strict(uri)?
        } else {
            BackendKind::from_uri(uri)
        };

        if BackendKind::is_fallback(uri) {
            warn!(uri = %uri, "unrecognised scheme, treating uri as a file path");
        }

        let store = create_store(&kind, &options).await?;
        info!(backend = store.backend_name(), "process store ready");
        Ok(Self { store })
    }

    /// Wrap an adapter built by the caller.
    pub fn from_store(store: Box<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Name of the bound backend.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Save a new document, assigning an id if it has none.
    pub async fn persist(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        self.observe("persist", self.store.save(doc).await)
    }

    /// Load one document by id. `Ok(None)` when absent.
    pub async fn load(&self, id: &str) -> Result<Option<StoredRecord>> {
        self.observe("load", self.store.get(id).await)
    }

    /// Load every stored document.
    pub async fn load_all(&self) -> Result<Vec<StoredRecord>> {
        self.observe("load_all", self.store.list().await)
    }

    /// Replace an existing document. The document must carry its id.
    pub async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        self.observe("update", self.store.update(doc).await)
    }

    /// Delete a document. Absent ids are not an error.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.observe("remove", self.store.remove(id).await)
    }

    /// Release the backend connection.
    pub async fn close(self) -> Result<()> {
        let backend = self.store.backend_name();
        let result = self.observe("close", self.store.close().await);
        info!(backend, "process store closed");
        result
    }

    fn observe<T>(&self, op: &'static str, result: Result<T>) -> Result<T> {
        let backend = self.store.backend_name();
        metrics::counter!("procstore_operations_total", "backend" => backend, "op" => op)
            .increment(1);
        if let Err(e) = &result {
            metrics::counter!("procstore_operation_errors_total", "backend" => backend, "op" => op)
                .increment(1);
            warn!(backend, op, error = %e, "process store operation failed");
        }
        result
    }
}
