//! Document metadata conventions.
//!
//! Documents are JSON objects. The server stores its bookkeeping under
//! `@metadata`: the document key (`@id`), its etag (`@etag`) and the name of
//! the collection it belongs to.

use serde_json::Value;

/// Key of the metadata object inside a document.
pub const METADATA_KEY: &str = "@metadata";
/// Metadata key holding the document key.
pub const ID_KEY: &str = "@id";
/// Metadata key holding the document etag.
pub const ETAG_KEY: &str = "@etag";
/// Metadata key holding the collection name.
pub const ENTITY_NAME_KEY: &str = "Entity-Name";

fn metadata(document: &Value) -> Option<&serde_json::Map<String, Value>> {
    document.get(METADATA_KEY)?.as_object()
}

/// Returns the document key recorded in the metadata.
pub fn document_id(document: &Value) -> Option<&str> {
    metadata(document)?.get(ID_KEY)?.as_str()
}

/// Returns the document etag recorded in the metadata.
pub fn document_etag(document: &Value) -> Option<u64> {
    metadata(document)?.get(ETAG_KEY)?.as_u64()
}

/// Returns the collection name recorded in the metadata.
pub fn document_collection(document: &Value) -> Option<&str> {
    metadata(document)?.get(ENTITY_NAME_KEY)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_metadata() {
        let doc = json!({
            "name": "Alice",
            "@metadata": {"@id": "users/1", "@etag": 12, "Entity-Name": "users"}
        });
        assert_eq!(document_id(&doc), Some("users/1"));
        assert_eq!(document_etag(&doc), Some(12));
        assert_eq!(document_collection(&doc), Some("users"));
    }

    #[test]
    fn missing_metadata() {
        let doc = json!({"name": "Alice"});
        assert_eq!(document_id(&doc), None);
        assert_eq!(document_etag(&Value::Null), None);
    }
}
