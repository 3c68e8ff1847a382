//! Identity map of documents materialized by the session.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// A document the session has already materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDocument {
    /// Document key as returned by the server.
    pub key: String,
    /// Etag at load time, when the server sent one.
    pub etag: Option<u64>,
    /// Name of the entity type the document was converted for.
    pub entity_type: String,
    /// Converted document body.
    pub document: Value,
}

/// Tracks loaded documents by key.
///
/// Keys compare case-insensitively.
#[derive(Debug, Default)]
pub struct DocumentTracker {
    documents: RwLock<HashMap<String, TrackedDocument>>,
}

impl DocumentTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> String {
        key.to_lowercase()
    }

    /// Tracks a document, replacing any earlier version.
    pub fn track(&self, document: TrackedDocument) {
        self.documents
            .write()
            .insert(Self::normalize(&document.key), document);
    }

    /// Returns the tracked document for `key`.
    pub fn get(&self, key: &str) -> Option<TrackedDocument> {
        self.documents.read().get(&Self::normalize(key)).cloned()
    }

    /// Returns true if `key` is tracked.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.documents.read().contains_key(&Self::normalize(key))
    }

    /// Number of tracked documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}
