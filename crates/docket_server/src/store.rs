//! In-memory document store.

use crate::error::{ServerError, ServerResult};
use docket_protocol::{ENTITY_NAME_KEY, ETAG_KEY, ID_KEY, METADATA_KEY};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Key as written.
    pub key: String,
    /// Etag assigned by the last write.
    pub etag: u64,
    /// Collection derived from the key prefix.
    pub collection: String,
    /// Document body without metadata.
    pub body: Map<String, Value>,
}

impl StoredDocument {
    /// Renders the document with its `@metadata` block.
    pub fn to_value(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert(ID_KEY.to_string(), Value::String(self.key.clone()));
        metadata.insert(ETAG_KEY.to_string(), Value::from(self.etag));
        metadata.insert(
            ENTITY_NAME_KEY.to_string(),
            Value::String(self.collection.clone()),
        );

        let mut document = self.body.clone();
        document.insert(METADATA_KEY.to_string(), Value::Object(metadata));
        Value::Object(document)
    }
}

/// Collection of a key: the part before the first `/`.
pub fn collection_of(key: &str) -> &str {
    key.split('/').next().unwrap_or(key)
}

/// Server-side document storage.
///
/// Keys compare case-insensitively. Every write takes the next etag, so the
/// last etag tells indexes how far behind they are.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<BTreeMap<String, StoredDocument>>,
    last_etag: RwLock<u64>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_etag(&self) -> u64 {
        let mut etag = self.last_etag.write();
        *etag += 1;
        *etag
    }

    /// Etag of the last write.
    pub fn last_etag(&self) -> u64 {
        *self.last_etag.read()
    }

    /// Stores a document and returns its etag.
    ///
    /// Incoming `@metadata` is discarded.
    pub fn put(&self, key: &str, document: Value) -> ServerResult<u64> {
        let Value::Object(mut body) = document else {
            return Err(ServerError::InvalidRequest(format!(
                "document {} must be a JSON object",
                key
            )));
        };
        if key.is_empty() {
            return Err(ServerError::InvalidRequest("empty document key".into()));
        }
        body.remove(METADATA_KEY);

        let etag = self.next_etag();
        let stored = StoredDocument {
            key: key.to_string(),
            etag,
            collection: collection_of(key).to_string(),
            body,
        };
        self.documents.write().insert(key.to_lowercase(), stored);
        Ok(etag)
    }

    /// Deletes a document; returns false if it did not exist.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.documents.write().remove(&key.to_lowercase()).is_some();
        if removed {
            self.next_etag();
        }
        removed
    }

    /// Returns a document with its metadata.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.documents
            .read()
            .get(&key.to_lowercase())
            .map(StoredDocument::to_value)
    }

    /// Returns the documents whose key starts with `prefix`, in key order.
    ///
    /// `matches` and `exclude` are `|`-separated wildcard patterns (`*`, `?`)
    /// applied to the rest of the key.
    pub fn starting_with(
        &self,
        prefix: &str,
        matches: Option<&str>,
        exclude: Option<&str>,
        start: usize,
        page_size: usize,
    ) -> Vec<Value> {
        let prefix_lower = prefix.to_lowercase();
        self.documents
            .read()
            .range(prefix_lower.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix_lower))
            .filter(|(key, _)| {
                let rest = &key[prefix_lower.len()..];
                matches.map_or(true, |m| matches_any(m, rest))
                    && !exclude.map_or(false, |e| matches_any(e, rest))
            })
            .skip(start)
            .take(page_size)
            .map(|(_, doc)| doc.to_value())
            .collect()
    }

    /// Returns every document of a collection.
    pub fn collection(&self, collection: &str) -> Vec<StoredDocument> {
        self.documents
            .read()
            .values()
            .filter(|doc| doc.collection.eq_ignore_ascii_case(collection))
            .cloned()
            .collect()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

fn matches_any(patterns: &str, text: &str) -> bool {
    patterns
        .split('|')
        .filter(|p| !p.is_empty())
        .any(|p| wildcard_match(&p.to_lowercase(), text))
}

/// Matches `*` (any run) and `?` (any single character).
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
