//! Process documents and their stored form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field holding the primary key of every process document.
pub const ID_FIELD: &str = "id";

/// Schemaless process-instance document.
pub type ProcessDocument = Map<String, Value>;

/// A process document as materialised by a backend.
///
/// `doc` always carries the `id` field. Timestamps are present when the
/// backend maintains them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub doc: ProcessDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Record without store-maintained timestamps.
    pub fn new(id: impl Into<String>, doc: ProcessDocument) -> Self {
        Self {
            id: id.into(),
            doc,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_timestamps(
        mut self,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }
}

/// Read the id of a document.
///
/// `None` when the field is absent, `null` or an empty string.
pub fn document_id(doc: &ProcessDocument) -> Result<Option<&str>> {
    match doc.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Error::Validation(format!(
            "document id must be a string, got {}",
            other
        ))),
    }
}

/// Return the document id, generating and injecting a UUID v4 if it has none.
pub fn ensure_id(doc: &mut ProcessDocument) -> Result<String> {
    if let Some(id) = document_id(doc)? {
        return Ok(id.to_string());
    }
    let id = uuid::Uuid::new_v4().to_string();
    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    Ok(id)
}

/// Return the document id, failing if the caller did not supply one.
pub fn require_id(doc: &ProcessDocument) -> Result<String> {
    document_id(doc)?
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("update requires a document id".to_string()))
}

/// Parse stored JSON text into a document.
pub(crate) fn parse_document(backend: &'static str, text: &str) -> Result<ProcessDocument> {
    match serde_json::from_str::<Value>(text).map_err(|e| Error::store(backend, e))? {
        Value::Object(map) => Ok(map),
        other => Err(Error::store(
            backend,
            format!("stored document is not a JSON object: {}", other),
        )),
    }
}

/// Serialize a document to JSON text.
pub(crate) fn to_json_text(backend: &'static str, doc: &ProcessDocument) -> Result<String> {
    serde_json::to_string(doc).map_err(|e| Error::store(backend, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ProcessDocument {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_ensure_id_generates_uuid() {
        let mut d = doc(json!({"name": "order-1"}));
        let id = ensure_id(&mut d).unwrap();

        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(d.get("id"), Some(&Value::String(id)));
        assert_eq!(d.get("name"), Some(&json!("order-1")));
    }

    #[test]
    fn test_ensure_id_preserves_existing() {
        let mut d = doc(json!({"id": "fixed", "name": "order-2"}));
        assert_eq!(ensure_id(&mut d).unwrap(), "fixed");
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_ensure_id_replaces_null_and_empty() {
        let mut d = doc(json!({"id": null}));
        let id = ensure_id(&mut d).unwrap();
        assert!(!id.is_empty());

        let mut d = doc(json!({"id": ""}));
        let id = ensure_id(&mut d).unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn test_non_string_id_rejected() {
        let mut d = doc(json!({"id": 42}));
        assert!(ensure_id(&mut d).unwrap_err().is_validation());
        assert!(require_id(&d).unwrap_err().is_validation());
    }

    #[test]
    fn test_require_id() {
        let d = doc(json!({"name": "no id"}));
        assert!(require_id(&d).unwrap_err().is_validation());

        let d = doc(json!({"id": "abc"}));
        assert_eq!(require_id(&d).unwrap(), "abc");
    }

    #[test]
    fn test_parse_document_rejects_non_object() {
        assert!(parse_document("file", "[1, 2]").unwrap_err().is_store());
        assert!(parse_document("file", "not json").unwrap_err().is_store());

        let parsed = parse_document("file", r#"{"id":"a","n":1}"#).unwrap();
        assert_eq!(parsed.get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_record_serialization_skips_missing_timestamps() {
        let record = StoredRecord::new("a", doc(json!({"id": "a"})));
        let text = serde_json::to_string(&record).unwrap();
        assert!(!text.contains("created_at"));

        let back: StoredRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
