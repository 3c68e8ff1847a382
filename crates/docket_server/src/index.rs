//! Indexes with simulated asynchronous indexing.
//!
//! An index answers queries from a snapshot of its collection taken at the
//! last catch-up. While the store has writes the snapshot has not seen, the
//! index is stale and its query results say so.

use crate::error::{ServerError, ServerResult};
use crate::store::{wildcard_match, DocumentStore};
use docket_protocol::METADATA_KEY;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// One index over a collection.
#[derive(Debug, Clone)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed collection.
    pub collection: String,
    /// Store etag covered by the snapshot.
    pub indexed_etag: u64,
    /// Stale reads served since the last catch-up.
    pub stale_reads: u32,
    entries: Vec<Value>,
}

impl Index {
    fn build(name: &str, collection: &str, store: &DocumentStore) -> Self {
        let mut index = Self {
            name: name.to_string(),
            collection: collection.to_string(),
            indexed_etag: 0,
            stale_reads: 0,
            entries: Vec::new(),
        };
        index.catch_up(store);
        index
    }

    fn catch_up(&mut self, store: &DocumentStore) {
        self.indexed_etag = store.last_etag();
        self.entries = store
            .collection(&self.collection)
            .iter()
            .map(|doc| doc.to_value())
            .collect();
        self.stale_reads = 0;
    }

    /// Returns true if the store has writes the index has not seen.
    pub fn is_stale(&self, store: &DocumentStore) -> bool {
        self.indexed_etag < store.last_etag()
    }

    /// Documents matching `query`, in key order.
    pub fn search(&self, query: &str) -> ServerResult<Vec<&Value>> {
        let terms = parse_query(query)?;
        Ok(self
            .entries
            .iter()
            .filter(|doc| terms.iter().all(|term| term.matches(doc)))
            .collect())
    }

    /// Distinct string values of `field`, lowercased.
    pub fn terms(&self, field: &str) -> Vec<String> {
        let mut terms: Vec<String> = self
            .entries
            .iter()
            .filter_map(|doc| field_value(doc, field))
            .filter_map(|value| value.as_str().map(str::to_lowercase))
            .collect();
        terms.sort();
        terms.dedup();
        terms
    }
}

/// A `field:value` term.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    field: String,
    pattern: String,
}

impl Term {
    fn matches(&self, document: &Value) -> bool {
        let Some(value) = field_value(document, &self.field) else {
            return false;
        };
        match value {
            Value::Array(items) => items.iter().any(|item| self.matches_scalar(item)),
            other => self.matches_scalar(other),
        }
    }

    fn matches_scalar(&self, value: &Value) -> bool {
        let text = match value {
            Value::String(s) => s.to_lowercase(),
            Value::Null | Value::Object(_) | Value::Array(_) => return false,
            other => other.to_string(),
        };
        wildcard_match(&self.pattern, &text)
    }
}

/// Parses `field:value AND field:value`; an empty query or `*` matches all.
fn parse_query(query: &str) -> ServerResult<Vec<Term>> {
    let query = query.trim();
    if query.is_empty() || query == "*" || query == "*:*" {
        return Ok(Vec::new());
    }
    query
        .split(" AND ")
        .map(|clause| {
            let clause = clause.trim();
            let (field, value) = clause.split_once(':').ok_or_else(|| {
                ServerError::InvalidRequest(format!("expected field:value, got '{}'", clause))
            })?;
            if field.is_empty() {
                return Err(ServerError::InvalidRequest(format!("missing field in '{}'", clause)));
            }
            Ok(Term {
                field: field.trim().to_string(),
                pattern: value.trim().trim_matches('"').to_lowercase(),
            })
        })
        .collect()
}

/// Looks up a dotted path, ignoring the metadata block.
pub(crate) fn field_value<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path == METADATA_KEY {
        return None;
    }
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

/// All indexes of the server.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, Index>>,
}

impl IndexRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(name: &str) -> String {
        name.to_lowercase()
    }

    /// Creates an index over `collection`, current as of now.
    pub fn create(&self, name: &str, collection: &str, store: &DocumentStore) -> ServerResult<()> {
        let mut indexes = self.indexes.write();
        let key = Self::normalize(name);
        if indexes.contains_key(&key) {
            return Err(ServerError::IndexExists(name.to_string()));
        }
        indexes.insert(key, Index::build(name, collection, store));
        Ok(())
    }

    /// Brings every index up to date.
    pub fn catch_up_all(&self, store: &DocumentStore) {
        for index in self.indexes.write().values_mut() {
            index.catch_up(store);
        }
    }

    /// Returns true if the index exists and is stale.
    pub fn is_stale(&self, name: &str, store: &DocumentStore) -> Option<bool> {
        self.indexes
            .read()
            .get(&Self::normalize(name))
            .map(|index| index.is_stale(store))
    }

    /// Index names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().values().map(|i| i.name.clone()).collect();
        names.sort();
        names
    }

    /// Runs `f` against an index, counting a stale read if the index is
    /// behind. After `catch_up_after` stale reads (when non-zero) the index
    /// catches up for the next reader.
    pub fn read<R>(
        &self,
        name: &str,
        store: &DocumentStore,
        catch_up_after: u32,
        f: impl FnOnce(&Index, bool) -> R,
    ) -> ServerResult<R> {
        let mut indexes = self.indexes.write();
        let index = indexes
            .get_mut(&Self::normalize(name))
            .ok_or_else(|| ServerError::UnknownIndex(name.to_string()))?;

        let stale = index.is_stale(store);
        let result = f(index, stale);
        if stale {
            index.stale_reads += 1;
            if catch_up_after > 0 && index.stale_reads >= catch_up_after {
                tracing::debug!(index = %index.name, "index caught up after stale reads");
                index.catch_up(store);
            }
        }
        Ok(result)
    }
}
