//! Flat-file document store.
//!
//! This is the default backend: any URI without a recognised scheme lands
//! here. All records live in one JSON array, in insertion order.

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::document::{ensure_id, require_id, ProcessDocument, StoredRecord};
use crate::error::{Error, Result};
use crate::traits::DocumentStore;

const BACKEND: &str = "file";

/// JSON file backed document store.
///
/// Every write is a read-modify-write done under an exclusive advisory
/// lock on `<path>.lock`, so several stores (or processes) may share one
/// file. The new contents go to a uniquely named temp file in the same
/// directory and are renamed over the old file; readers take no lock and
/// never observe a torn file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl FileStore {
    /// Create a store over the given file.
    ///
    /// Nothing touches the disk until the first operation; a missing file
    /// is an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the file path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed { backend: BACKEND });
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<StoredRecord>> {
        match fs::read(&self.path).await {
            Ok(data) => decode(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::store(BACKEND, e)),
        }
    }

    /// Run `f` over the stored records under the file lock. The records are
    /// written back only when `f` reports a change.
    async fn modify<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<StoredRecord>) -> Result<(T, bool)> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let lock = lock_exclusive(&path)?;
            let mut records = read_records(&path)?;
            let (value, changed) = f(&mut records)?;
            if changed {
                write_records(&path, &records)?;
            }
            drop(lock);
            Ok(value)
        })
        .await
        .map_err(|e| Error::store(BACKEND, e))?
    }
}

fn decode(data: &[u8]) -> Result<Vec<StoredRecord>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(data).map_err(|e| Error::store(BACKEND, e))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Open `<path>.lock` and block until it is held exclusively. The lock is
/// released when the returned handle is dropped.
fn lock_exclusive(path: &Path) -> Result<File> {
    std::fs::create_dir_all(parent_dir(path)).map_err(|e| Error::store(BACKEND, e))?;
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(|e| Error::store(BACKEND, e))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| Error::store(BACKEND, e))?;
    Ok(lock_file)
}

fn read_records(path: &Path) -> Result<Vec<StoredRecord>> {
    match std::fs::read(path) {
        Ok(data) => decode(&data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::store(BACKEND, e)),
    }
}

fn write_records(path: &Path, records: &[StoredRecord]) -> Result<()> {
    debug!("Writing {} records to {:?}", records.len(), path);
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path))
        .map_err(|e| Error::store(BACKEND, e))?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), records)
        .map_err(|e| Error::store(BACKEND, e))?;
    tmp.as_file_mut()
        .flush()
        .map_err(|e| Error::store(BACKEND, e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| Error::store(BACKEND, e))?;
    tmp.persist(path)
        .map_err(|e| Error::store(BACKEND, e.error))?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileStore {
    #[instrument(skip(self, doc), fields(backend = BACKEND, path = ?self.path))]
    async fn save(&self, mut doc: ProcessDocument) -> Result<StoredRecord> {
        let id = ensure_id(&mut doc)?;
        self.ensure_open()?;

        self.modify(move |records| {
            if records.iter().any(|r| r.id == id) {
                return Err(Error::AlreadyExists { backend: BACKEND, id });
            }
            let now = Utc::now();
            let record = StoredRecord::new(id, doc).with_timestamps(Some(now), Some(now));
            records.push(record.clone());
            Ok((record, true))
        })
        .await
    }

    #[instrument(skip(self), fields(backend = BACKEND, path = ?self.path))]
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        self.ensure_open()?;
        let records = self.read_all().await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    #[instrument(skip(self, doc), fields(backend = BACKEND, path = ?self.path))]
    async fn update(&self, doc: ProcessDocument) -> Result<StoredRecord> {
        let id = require_id(&doc)?;
        self.ensure_open()?;

        self.modify(move |records| {
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::NotFound { backend: BACKEND, id: id.clone() })?;
            record.doc = doc;
            record.updated_at = Some(Utc::now());
            Ok((record.clone(), true))
        })
        .await
    }

    #[instrument(skip(self), fields(backend = BACKEND, path = ?self.path))]
    async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        let id = id.to_string();

        self.modify(move |records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            Ok(((), records.len() != before))
        })
        .await
    }

    #[instrument(skip(self), fields(backend = BACKEND, path = ?self.path))]
    async fn list(&self) -> Result<Vec<StoredRecord>> {
        self.ensure_open()?;
        self.read_all().await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("nested").join("instances.json"));
        (store, temp)
    }

    fn doc(value: serde_json::Value) -> ProcessDocument {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let (store, _temp) = create_test_store();
        for name in ["c", "a", "b"] {
            store.save(doc(json!({"id": name}))).await.unwrap();
        }

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let (store, _temp) = create_test_store();
        let saved = store.save(doc(json!({"step": "approve"}))).await.unwrap();

        let reopened = FileStore::new(store.path());
        let loaded = reopened.get(&saved.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let (store, _temp) = create_test_store();
        store.save(doc(json!({"id": "a"}))).await.unwrap();
        store.remove("a").await.unwrap();

        let parent = store.path().parent().unwrap();
        let mut names: Vec<_> = std::fs::read_dir(parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["instances.json", "instances.json.lock"]);
    }

    #[tokio::test]
    async fn test_stores_sharing_a_file_lose_no_writes() {
        let (first, _temp) = create_test_store();
        let path = first.path().to_path_buf();

        let mut handles = Vec::new();
        for writer in 0..8 {
            let store = std::sync::Arc::new(FileStore::new(&path));
            for n in 0..20 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.save(doc(json!({"writer": writer, "n": n}))).await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(first.list().await.unwrap().len(), 160);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let (store, _temp) = create_test_store();
        store.save(doc(json!({"id": "a"}))).await.unwrap();
        store.close().await.unwrap();

        let err = store.get("a").await.unwrap_err();
        assert!(matches!(err, Error::Closed { backend: "file" }));
        assert!(store.save(doc(json!({"id": "b"}))).await.unwrap_err().is_store());
        assert!(store.list().await.unwrap_err().is_store());

        // The data itself is untouched.
        let reopened = FileStore::new(store.path());
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_store_error() {
        let (store, _temp) = create_test_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.list().await.unwrap_err();
        assert!(err.is_store());
    }
}
