//! Connection URI scheme to backend mapping.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Backend kind selected by a connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// JSON file at the given path
    File(PathBuf),
    /// SQLite database file, or in-memory when `None`
    Sqlite(Option<PathBuf>),
    /// PostgreSQL, full URI
    Postgres(String),
    /// Redis, full URI
    Redis(String),
    /// MongoDB, full URI
    MongoDb(String),
    /// Supabase project host
    Supabase(String),
    /// Process-local memory
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File(_) => write!(f, "file"),
            BackendKind::Sqlite(_) => write!(f, "sqlite"),
            BackendKind::Postgres(_) => write!(f, "postgres"),
            BackendKind::Redis(_) => write!(f, "redis"),
            BackendKind::MongoDb(_) => write!(f, "mongodb"),
            BackendKind::Supabase(_) => write!(f, "supabase"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

impl BackendKind {
    /// Select a backend from a URI.
    ///
    /// Unrecognised schemes fall back to a file path made of the whole URI.
    pub fn from_uri(uri: &str) -> Self {
        let (scheme, rest) = match uri.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None if uri.starts_with("sqlite:") => return BackendKind::sqlite(&uri["sqlite:".len()..]),
            None => return BackendKind::File(PathBuf::from(uri)),
        };

        match scheme.as_str() {
            "file" => BackendKind::File(PathBuf::from(rest)),
            "sqlite" => BackendKind::sqlite(rest),
            "postgres" | "postgresql" => BackendKind::Postgres(uri.to_string()),
            "redis" | "rediss" => BackendKind::Redis(uri.to_string()),
            "mongodb" | "mongodb+srv" => BackendKind::MongoDb(uri.to_string()),
            "supabase" => BackendKind::Supabase(rest.trim_end_matches('/').to_string()),
            "memory" | "mem" => BackendKind::Memory,
            _ => BackendKind::File(PathBuf::from(uri)),
        }
    }

    /// Select a backend from a URI, rejecting unrecognised schemes.
    pub fn from_uri_strict(uri: &str) -> Result<Self> {
        if Self::is_fallback(uri) {
            return Err(Error::Configuration(format!(
                "unrecognised connection scheme in uri: {}",
                uri
            )));
        }
        Ok(Self::from_uri(uri))
    }

    /// True when `uri` names a scheme this crate does not know, so that
    /// `from_uri` treats the whole URI as a file path.
    pub(crate) fn is_fallback(uri: &str) -> bool {
        let named_scheme = uri
            .split_once("://")
            .is_some_and(|(scheme, _)| !scheme.eq_ignore_ascii_case("file"));
        named_scheme && matches!(Self::from_uri(uri), BackendKind::File(_))
    }

    fn sqlite(target: &str) -> Self {
        match target {
            "" | ":memory:" => BackendKind::Sqlite(None),
            path => BackendKind::Sqlite(Some(PathBuf::from(path))),
        }
    }
}
