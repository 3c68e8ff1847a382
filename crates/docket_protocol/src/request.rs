//! A single request inside a multi-get batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One logical GET request carried inside a multi-get batch.
///
/// A request is built once per attempt by a lazy operation and is not
/// modified afterwards. Query parameters keep their insertion order, and a
/// name may repeat (`id=a&id=b`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Target path, relative to the database root (e.g. `/docs`).
    url: String,
    /// Ordered query parameters.
    #[serde(default)]
    query: Vec<(String, String)>,
    /// Request headers.
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl WireRequest {
    /// Creates a request for the given path with no parameters.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Appends a query parameter when `value` is present.
    #[must_use]
    pub fn with_optional_param<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_param(name, value),
            None => self,
        }
    }

    /// Appends every pair as a query parameter.
    #[must_use]
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the target path.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns all query parameters in order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the first value of a query parameter.
    pub fn param<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.params(name).next()
    }

    /// Returns every value of a (possibly repeated) query parameter.
    pub fn params<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns the query string (`a=1&b=2`), unescaped.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Returns the path and query string, for logs and timing reports.
    pub fn url_and_query(&self) -> String {
        if self.query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.query_string())
        }
    }
}
