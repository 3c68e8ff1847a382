//! Index queries and their results.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 128;

/// A query against a named index.
///
/// The query text is passed to the server untouched; the client does not
/// interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    /// Query text.
    pub query: String,
    /// Number of results to skip.
    pub start: u32,
    /// Maximum number of results to return.
    pub page_size: u32,
    /// Document paths the server should include alongside the results.
    pub includes: Vec<String>,
    /// Whether the caller refuses results computed against a stale index.
    pub wait_for_non_stale_results: bool,
}

impl IndexQuery {
    /// Creates a query with default paging.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start: 0,
            page_size: DEFAULT_PAGE_SIZE,
            includes: Vec::new(),
            wait_for_non_stale_results: false,
        }
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn with_start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Adds an include path.
    #[must_use]
    pub fn with_include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Refuses stale results.
    #[must_use]
    pub fn wait_for_non_stale_results(mut self) -> Self {
        self.wait_for_non_stale_results = true;
        self
    }

    /// Renders the query as request parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("query".to_string(), self.query.clone()),
            ("start".to_string(), self.start.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        params.extend(
            self.includes
                .iter()
                .map(|path| ("include".to_string(), path.clone())),
        );
        if self.wait_for_non_stale_results {
            params.push(("waitForNonStaleResults".to_string(), "true".to_string()));
        }
        params
    }
}

/// Loads documents whose key starts with a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartsWithQuery {
    /// Key prefix.
    pub prefix: String,
    /// `|`-separated wildcard patterns the rest of the key must match.
    pub matches: Option<String>,
    /// `|`-separated wildcard patterns the rest of the key must not match.
    pub exclude: Option<String>,
    /// Number of documents to skip.
    pub start: u32,
    /// Maximum number of documents to return.
    pub page_size: u32,
}

impl StartsWithQuery {
    /// Creates a prefix query returning at most 25 documents.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            matches: None,
            exclude: None,
            start: 0,
            page_size: 25,
        }
    }

    /// Sets the patterns the key remainder must match.
    #[must_use]
    pub fn with_matches(mut self, matches: impl Into<String>) -> Self {
        self.matches = Some(matches.into());
        self
    }

    /// Sets the patterns the key remainder must not match.
    #[must_use]
    pub fn with_exclude(mut self, exclude: impl Into<String>) -> Self {
        self.exclude = Some(exclude.into());
        self
    }

    /// Sets paging.
    #[must_use]
    pub fn with_paging(mut self, start: u32, page_size: u32) -> Self {
        self.start = start;
        self.page_size = page_size;
        self
    }

    /// Renders the query as request parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("startsWith".to_string(), self.prefix.clone())];
        if let Some(matches) = &self.matches {
            params.push(("matches".to_string(), matches.clone()));
        }
        if let Some(exclude) = &self.exclude {
            params.push(("exclude".to_string(), exclude.clone()));
        }
        params.push(("start".to_string(), self.start.to_string()));
        params.push(("pageSize".to_string(), self.page_size.to_string()));
        params
    }
}

/// Result of an index query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching documents, in result order.
    pub results: Vec<Value>,
    /// Documents pulled in through include paths.
    #[serde(default)]
    pub includes: Vec<Value>,
    /// Whether the index had not yet caught up with all writes.
    #[serde(default)]
    pub is_stale: bool,
    /// Total number of matches, ignoring paging.
    #[serde(default)]
    pub total_results: u64,
    /// Number of results skipped by the server.
    #[serde(default)]
    pub skipped_results: u64,
    /// Name of the index that answered.
    #[serde(default)]
    pub index_name: String,
    /// Last document etag the index has processed.
    #[serde(default)]
    pub index_etag: u64,
}

impl QueryResult {
    /// Parses a query result payload.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        if !value.is_object() {
            return Err(ProtocolError::invalid_payload(
                "query result must be an object",
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ProtocolError::invalid_payload(format!("query result: {}", e)))
    }

    /// Converts to a JSON payload.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
