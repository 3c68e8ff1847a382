//! A single response inside a multi-get batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the server-side processing time in milliseconds.
pub const REQUEST_TIME_HEADER: &str = "Temp-Request-Time";

/// Default header used to flag a result computed against a stale index.
pub const INDEX_STALE_HEADER: &str = "Docket-Index-Stale";

/// The response to one [`WireRequest`](crate::WireRequest) of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    /// HTTP status code of this individual response.
    status: u16,
    /// JSON payload.
    #[serde(default)]
    result: Value,
    /// Response headers.
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl WireResponse {
    /// Creates a response with the given status and payload.
    pub fn new(status: u16, result: Value) -> Self {
        Self {
            status,
            result,
            headers: BTreeMap::new(),
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(result: Value) -> Self {
        Self::new(200, result)
    }

    /// Creates a `404 Not Found` response with an empty payload.
    pub fn not_found() -> Self {
        Self::new(404, Value::Null)
    }

    /// Creates an error response whose payload carries `message`.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, serde_json::json!({ "error": message.into() }))
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the payload.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Returns all headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Looks up a header, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true for 2xx and `304 Not Modified`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 304
    }

    /// Returns true for `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns true when the status is neither a success nor a 404.
    pub fn request_has_errors(&self) -> bool {
        !self.is_success() && !self.is_not_found()
    }

    /// Server-side processing time, if the server reported it.
    pub fn request_time(&self) -> Option<Duration> {
        self.header(REQUEST_TIME_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// Best-effort error text for a failed response.
    pub fn error_message(&self) -> String {
        match &self.result {
            Value::Object(map) => match map.get("error") {
                Some(Value::String(message)) => message.clone(),
                _ => self.result.to_string(),
            },
            Value::String(message) => message.clone(),
            Value::Null => format!("status {}", self.status),
            other => other.to_string(),
        }
    }
}
