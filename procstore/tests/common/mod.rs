//! Contract checks every backend must pass.

#![allow(dead_code)]

use procstore::{DocumentStore, Error, ProcessDocument, ProcessStore};
use serde_json::{json, Value};
use std::collections::HashSet;

pub fn doc(value: Value) -> ProcessDocument {
    value.as_object().cloned().expect("test documents are objects")
}

pub fn unique_id(label: &str) -> String {
    format!("{}-{}", label, uuid::Uuid::new_v4())
}

/// Save without id: id is generated, stable, and the body round-trips.
pub async fn check_save_assigns_id(store: &ProcessStore) {
    let original = doc(json!({"name": "order-1", "items": [1, 2, 3], "meta": {"priority": "high"}}));
    let saved = store.persist(original.clone()).await.unwrap();

    assert!(!saved.id.is_empty());
    assert!(uuid::Uuid::parse_str(&saved.id).is_ok());

    let mut expected = original;
    expected.insert("id".to_string(), json!(saved.id));
    assert_eq!(saved.doc, expected);

    let loaded = store.load(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, saved.id);
    assert_eq!(loaded.doc, expected);

    let again = store.load(&saved.id).await.unwrap().unwrap();
    assert_eq!(again.id, saved.id);

    store.remove(&saved.id).await.unwrap();
}

/// Save with a pre-set id keeps that exact id; a second save of it fails.
pub async fn check_save_preserves_id(store: &ProcessStore) {
    let id = unique_id("preset");
    let saved = store
        .persist(doc(json!({"id": id, "state": "running"})))
        .await
        .unwrap();
    assert_eq!(saved.id, id);

    let err = store.persist(doc(json!({"id": id}))).await.unwrap_err();
    assert!(err.is_store(), "duplicate save should be a store error: {err}");

    store.remove(&id).await.unwrap();
}

/// Unknown ids: load is None, remove is a no-op, update is a store error.
pub async fn check_missing_ids(store: &ProcessStore) {
    let id = unique_id("never-saved");
    assert!(store.load(&id).await.unwrap().is_none());

    store.remove(&id).await.unwrap();
    store.remove(&id).await.unwrap();

    let err = store.update(doc(json!({"id": id, "x": 1}))).await.unwrap_err();
    assert!(err.is_not_found(), "update of unknown id: {err}");
    assert!(store.load(&id).await.unwrap().is_none(), "update must not upsert");
}

/// Update without id is rejected as a validation error.
pub async fn check_update_requires_id(store: &ProcessStore) {
    let err = store.update(doc(json!({"name": "no id"}))).await.unwrap_err();
    assert!(err.is_validation());
}

/// Update replaces the body wholesale.
pub async fn check_update_replaces_body(store: &ProcessStore) {
    let saved = store
        .persist(doc(json!({"step": "draft", "owner": "alice"})))
        .await
        .unwrap();

    let replacement = doc(json!({"id": saved.id, "step": "approved"}));
    let updated = store.update(replacement.clone()).await.unwrap();
    assert_eq!(updated.id, saved.id);
    assert_eq!(updated.doc, replacement);

    let loaded = store.load(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.doc, replacement);
    assert!(!loaded.doc.contains_key("owner"));

    store.remove(&saved.id).await.unwrap();
}

/// Listing after N saves returns those N records.
pub async fn check_list(store: &ProcessStore) {
    let before: HashSet<String> = store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();

    let mut saved = HashSet::new();
    for n in 0..5 {
        let record = store.persist(doc(json!({"n": n}))).await.unwrap();
        saved.insert(record.id);
    }

    let listed: Vec<_> = store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| !before.contains(&r.id))
        .collect();
    assert_eq!(listed.len(), 5);
    for record in &listed {
        assert!(saved.contains(&record.id));
        assert_eq!(record.doc.get("id"), Some(&json!(record.id)));
    }

    for id in &saved {
        store.remove(id).await.unwrap();
    }
}

/// Save, load, remove, load again.
pub async fn check_lifecycle(store: &ProcessStore) {
    let saved = store.persist(doc(json!({"name": "order-1"}))).await.unwrap();
    assert_eq!(saved.doc.get("name"), Some(&json!("order-1")));

    let loaded = store.load(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded.doc, saved.doc);

    store.remove(&saved.id).await.unwrap();
    assert!(store.load(&saved.id).await.unwrap().is_none());
}

/// Run every contract check against one store.
pub async fn run_contract(store: &ProcessStore) {
    check_save_assigns_id(store).await;
    check_save_preserves_id(store).await;
    check_missing_ids(store).await;
    check_update_requires_id(store).await;
    check_update_replaces_body(store).await;
    check_list(store).await;
    check_lifecycle(store).await;
}

/// After `close`, every operation on the adapter fails with `Error::Closed`.
pub async fn check_closed(store: Box<dyn DocumentStore>) {
    let backend = store.backend_name();
    let id = unique_id("closing");
    store.save(doc(json!({"id": id}))).await.unwrap();
    store.remove(&id).await.unwrap();
    store.close().await.unwrap();

    let results = [
        ("save", store.save(doc(json!({"id": unique_id("late")}))).await.err()),
        ("get", store.get(&id).await.err()),
        ("update", store.update(doc(json!({"id": id}))).await.err()),
        ("remove", store.remove(&id).await.err()),
        ("list", store.list().await.err()),
    ];
    for (op, err) in results {
        match err {
            Some(Error::Closed { backend: b }) => assert_eq!(b, backend),
            other => panic!("{backend} {op} after close: expected Closed, got {other:?}"),
        }
    }
}
