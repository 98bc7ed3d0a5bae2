//! Backend adapters, one per storage technology.

mod file;
mod memory;
mod sqlite;

#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "supabase")]
mod supabase;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "redis")]
pub use self::redis::{RedisStore, KEY_PREFIX};
#[cfg(feature = "supabase")]
pub use supabase::SupabaseStore;

use crate::config::{expand_tilde, StoreOptions};
use crate::error::{Error, Result};
use crate::scheme::BackendKind;
use crate::traits::DocumentStore;

/// Create the adapter for a backend kind.
///
/// Network backends open their connection here; nothing else about the
/// options is validated.
#[cfg_attr(
    not(all(
        feature = "postgres",
        feature = "redis",
        feature = "mongodb",
        feature = "supabase"
    )),
    allow(unused_variables)
)]
pub async fn create_store(
    kind: &BackendKind,
    options: &StoreOptions,
) -> Result<Box<dyn DocumentStore>> {
    match kind {
        BackendKind::File(path) if path.as_os_str().is_empty() => Err(Error::Configuration(
            "file storage requires a non-empty path".to_string(),
        )),
        BackendKind::File(path) => Ok(Box::new(FileStore::new(expand_tilde(path)?))),
        BackendKind::Sqlite(Some(path)) => Ok(Box::new(SqliteStore::open(expand_tilde(path)?)?)),
        BackendKind::Sqlite(None) => Ok(Box::new(SqliteStore::in_memory()?)),
        BackendKind::Memory => Ok(Box::new(MemoryStore::new())),

        #[cfg(feature = "postgres")]
        BackendKind::Postgres(uri) => Ok(Box::new(PostgresStore::connect(uri, options).await?)),
        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres(_) => Err(missing_feature("postgres")),

        #[cfg(feature = "redis")]
        BackendKind::Redis(uri) => Ok(Box::new(RedisStore::connect(uri, options).await?)),
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis(_) => Err(missing_feature("redis")),

        #[cfg(feature = "mongodb")]
        BackendKind::MongoDb(uri) => Ok(Box::new(MongoStore::connect(uri, options).await?)),
        #[cfg(not(feature = "mongodb"))]
        BackendKind::MongoDb(_) => Err(missing_feature("mongodb")),

        #[cfg(feature = "supabase")]
        BackendKind::Supabase(host) => Ok(Box::new(SupabaseStore::new(host, &options.supabase)?)),
        #[cfg(not(feature = "supabase"))]
        BackendKind::Supabase(_) => Err(missing_feature("supabase")),
    }
}

#[allow(dead_code)]
fn missing_feature(feature: &str) -> Error {
    Error::Configuration(format!(
        "{} storage requires the '{}' feature",
        feature, feature
    ))
}
