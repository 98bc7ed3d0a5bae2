//! Connection options and TOML configuration.
//!
//! # Configuration Examples
//!
//! ## Redis
//!
//! ```toml
//! [store]
//! uri = "redis://localhost:6379"
//! ```
//!
//! ## PostgreSQL with credentials kept out of the URI
//!
//! ```toml
//! [store]
//! uri = "postgres://db.internal:5432/workflows"
//! username = "workflow"
//! password = "secret"
//! max_connections = 10
//! ```
//!
//! ## Supabase
//!
//! ```toml
//! [store]
//! uri = "supabase://abcd1234.supabase.co"
//!
//! [store.supabase]
//! api_key = "service-role-key"
//! ```
//!
//! ## Logging
//!
//! ```toml
//! [logging]
//! level = "info,procstore=debug"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding `store.uri`.
pub const URI_ENV: &str = "PROCSTORE_URI";

/// Options used to construct a [`crate::ProcessStore`].
///
/// Only `uri` is checked at construction time. Backend-specific fields are
/// handed to the client library as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreOptions {
    /// Connection URI; its scheme selects the backend
    #[serde(default)]
    pub uri: Option<String>,

    /// Fail with a configuration error on an unrecognised scheme instead of
    /// treating the URI as a file path
    #[serde(default)]
    pub strict_scheme: bool,

    /// Database name (document database backend)
    #[serde(default = "default_database")]
    pub database: String,

    /// Pool size (relational backend)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Username overriding the one in the URI (relational, key-value)
    #[serde(default)]
    pub username: Option<String>,

    /// Password overriding the one in the URI (relational, key-value)
    #[serde(default)]
    pub password: Option<String>,

    /// Cloud document service settings
    #[serde(default)]
    pub supabase: SupabaseOptions,
}

fn default_database() -> String {
    "procstore".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            uri: None,
            strict_scheme: false,
            database: default_database(),
            max_connections: default_max_connections(),
            username: None,
            password: None,
            supabase: SupabaseOptions::default(),
        }
    }
}

/// Hosted PostgREST service settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SupabaseOptions {
    /// Project base URL; derived from the URI host when absent
    #[serde(default)]
    pub project_url: Option<String>,

    /// Project API key, sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}

impl StoreOptions {
    /// Options for the given connection URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the document database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the relational pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the cloud document service project URL and API key.
    pub fn with_supabase(
        mut self,
        project_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.supabase = SupabaseOptions {
            project_url: Some(project_url.into()),
            api_key: Some(api_key.into()),
        };
        self
    }

    /// Reject unrecognised schemes instead of falling back to a file path.
    pub fn strict(mut self) -> Self {
        self.strict_scheme = true;
        self
    }

    /// The configured URI, or a configuration error when none was supplied.
    pub fn require_uri(&self) -> Result<&str> {
        match self.uri.as_deref() {
            Some(uri) if !uri.trim().is_empty() => Ok(uri),
            _ => Err(Error::Configuration(
                "a connection uri is required".to_string(),
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::Configuration("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Parse configuration from TOML text, then apply environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_tilde(path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)
        };
        write().map_err(|e| Error::Configuration(format!("cannot write {}: {}", path.display(), e)))
    }

    fn apply_env(&mut self) {
        if let Ok(uri) = std::env::var(URI_ENV) {
            if !uri.is_empty() {
                self.store.uri = Some(uri);
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
    }
}
