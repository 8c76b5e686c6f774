//! Document model helpers.
//!
//! A document is a plain JSON object. System fields carry a `_` prefix
//! and are store metadata, not user data. The partition key is a slash
//! path (`/partition`) resolved against the document.

use serde_json::{Map, Value};

/// A raw document as stored in a container.
pub type Document = Map<String, Value>;

/// The mandatory identifier field.
pub const ID_FIELD: &str = "id";

/// Whether a top-level field is store metadata (`_ts`, `_etag`, `_rid`,
/// soft-delete flags, ...).
pub fn is_system_field(name: &str) -> bool {
    name.starts_with('_')
}

/// Resolve a slash path like `/address/city` against a document.
///
/// An empty path or a missing segment resolves to `None`. Array indexing
/// is not supported; partition keys address object members only.
pub fn resolve_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut current: Option<&Value> = None;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = match current {
            None => doc.get(segment),
            Some(Value::Object(map)) => map.get(segment),
            _ => return None,
        };
        current?;
    }
    current
}

/// Resolve the partition-key path to its string form.
///
/// Non-string scalar values are rendered with their JSON representation so
/// numeric partition keys still bind as parameters.
pub fn partition_key_of(doc: &Document, path: &str) -> Option<String> {
    match resolve_path(doc, path)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The document identifier, when present and a string.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Schema signature: the sorted, pipe-joined list of non-system top-level
/// field names. Two documents with the same signature have the same
/// top-level shape.
pub fn schema_signature(doc: &Document) -> String {
    let mut names: Vec<&str> = doc
        .keys()
        .map(String::as_str)
        .filter(|name| !is_system_field(name))
        .collect();
    names.sort_unstable();
    names.join("|")
}
