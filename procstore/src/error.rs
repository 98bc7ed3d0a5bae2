//! Error types shared by the facade and every backend adapter.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Boxed error coming out of a store client library.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Process store errors.
///
/// Three classes of failure exist: bad construction options
/// ([`Error::Configuration`]), caller contract violations
/// ([`Error::Validation`]) and anything reported by the underlying store
/// (every other variant, see [`Error::is_store`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid construction options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller violated the operation contract (e.g. update without an id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure reported by the store client. The client's own error is kept
    /// as the source.
    #[error("Store error ({backend}): {source}")]
    Store {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// Update addressed an id the store does not hold
    #[error("Process instance not found in {backend}: {id}")]
    NotFound { backend: &'static str, id: String },

    /// Save addressed an id the store already holds
    #[error("Process instance already exists in {backend}: {id}")]
    AlreadyExists { backend: &'static str, id: String },

    /// Adapter was used after `close`
    #[error("Store connection closed: {backend}")]
    Closed { backend: &'static str },
}

/// Result type for process store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a client-library error raised by `backend`.
    pub fn store(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Error::Store {
            backend,
            source: source.into(),
        }
    }

    /// Check if this is a construction/configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this is a caller contract violation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this failure came from the underlying store.
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            Error::Store { .. }
                | Error::NotFound { .. }
                | Error::AlreadyExists { .. }
                | Error::Closed { .. }
        )
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
            || matches!(self, Error::Store { source, .. }
                if source.downcast_ref::<io::Error>().map(|e| e.kind()) == Some(io::ErrorKind::NotFound))
    }

    /// Name of the backend that raised this error, if any.
    pub fn backend(&self) -> Option<&'static str> {
        match self {
            Error::Store { backend, .. }
            | Error::NotFound { backend, .. }
            | Error::AlreadyExists { backend, .. }
            | Error::Closed { backend } => Some(backend),
            Error::Configuration(_) | Error::Validation(_) => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}
