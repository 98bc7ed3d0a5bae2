//! Facade tests against the backends that need no external service.

mod common;

use procstore::{BackendKind, DocumentStore, FileStore, MemoryStore, ProcessStore, SqliteStore, StoreOptions};
use serde_json::json;
use tempfile::TempDir;

use common::doc;

#[tokio::test]
async fn test_file_backend_contract() {
    let temp = TempDir::new().unwrap();
    let uri = format!("file://{}", temp.path().join("instances.json").display());
    let store = procstore::connect(uri).await.unwrap();
    assert_eq!(store.backend_name(), "file");

    common::run_contract(&store).await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_plain_path_selects_file_backend() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plain.json");
    let store = procstore::connect(path.display().to_string()).await.unwrap();
    assert_eq!(store.backend_name(), "file");

    store.persist(doc(json!({"id": "p1"}))).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_sqlite_memory_contract() {
    let store = procstore::connect("sqlite::memory:").await.unwrap();
    assert_eq!(store.backend_name(), "sqlite");

    common::run_contract(&store).await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_file_contract() {
    let temp = TempDir::new().unwrap();
    let uri = format!("sqlite://{}", temp.path().join("instances.db").display());
    let store = procstore::connect(uri).await.unwrap();

    common::run_contract(&store).await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_memory_contract() {
    let store = procstore::connect("memory://").await.unwrap();
    assert_eq!(store.backend_name(), "memory");

    common::run_contract(&store).await;
}

#[tokio::test]
async fn test_missing_uri_is_configuration_error() {
    let err = ProcessStore::connect(StoreOptions::default()).await.unwrap_err();
    assert!(err.is_configuration());

    let err = procstore::connect("").await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_unrecognised_scheme_falls_back_to_file() {
    // Construction does not touch the disk, so the relative path is never created.
    let store = procstore::connect("ftp://x").await.unwrap();
    assert_eq!(store.backend_name(), "file");
    assert_eq!(
        BackendKind::from_uri("ftp://x"),
        BackendKind::File("ftp://x".into())
    );
}

#[tokio::test]
async fn test_strict_scheme_fails_fast() {
    let err = ProcessStore::connect(StoreOptions::new("ftp://x").strict())
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_update_validation_precedes_backend_io() {
    // A closed SQLite adapter fails any real I/O, so a validation error proves
    // the id check ran first.
    let store = procstore::SqliteStore::in_memory().unwrap();
    store.close().await.unwrap();
    let facade = ProcessStore::from_store(Box::new(store));

    let err = facade.update(doc(json!({"name": "no id"}))).await.unwrap_err();
    assert!(err.is_validation());

    let err = facade.load("anything").await.unwrap_err();
    assert!(err.is_store());
}

#[tokio::test]
async fn test_from_store_wraps_custom_adapter() {
    let adapter = MemoryStore::new();
    adapter.save(doc(json!({"id": "seeded"}))).await.unwrap();

    let store = ProcessStore::from_store(Box::new(adapter));
    let loaded = store.load("seeded").await.unwrap().unwrap();
    assert_eq!(loaded.doc, doc(json!({"id": "seeded"})));
    assert_eq!(format!("{:?}", store), "ProcessStore { backend: \"memory\" }");
}

#[tokio::test]
async fn test_concurrent_saves_to_file_are_not_lost() {
    let temp = TempDir::new().unwrap();
    let uri = temp.path().join("concurrent.json").display().to_string();
    let store = std::sync::Arc::new(procstore::connect(uri).await.unwrap());

    let mut handles = Vec::new();
    for n in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.persist(doc(json!({"n": n}))).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.load_all().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_closed_adapters_reject_calls() {
    let temp = TempDir::new().unwrap();
    common::check_closed(Box::new(FileStore::new(temp.path().join("closed.json")))).await;
    common::check_closed(Box::new(SqliteStore::in_memory().unwrap())).await;
    common::check_closed(Box::new(MemoryStore::new())).await;
}

#[cfg(not(feature = "redis"))]
#[tokio::test]
async fn test_compiled_out_backend_is_configuration_error() {
    let err = procstore::connect("redis://h").await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("'redis' feature"));
}

#[tokio::test]
async fn test_uppercase_file_scheme_is_recognised_in_strict_mode() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("upper.json");
    let uri = format!("FILE://{}", path.display());

    let store = ProcessStore::connect(StoreOptions::new(uri).strict())
        .await
        .unwrap();
    assert_eq!(store.backend_name(), "file");

    store.persist(doc(json!({"id": "u1"}))).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_empty_file_path_is_configuration_error() {
    let err = procstore::connect("file://").await.unwrap_err();
    assert!(err.is_configuration());
}
