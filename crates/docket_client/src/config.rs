//! Configuration for sessions and transports.

use docket_protocol::{QueryResult, WireResponse, INDEX_STALE_HEADER};
use std::time::Duration;

/// How a response reveals that it was computed against a stale index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleSignal {
    /// The `is_stale` flag of a query result payload.
    ResultFlag,
    /// A response header whose value is `true`.
    Header(String),
}

impl StaleSignal {
    /// Header signal using [`INDEX_STALE_HEADER`].
    pub fn header() -> Self {
        StaleSignal::Header(INDEX_STALE_HEADER.to_string())
    }

    /// Returns true if `response` reports a stale read.
    ///
    /// `query_result` is the parsed payload for operations that have one.
    pub fn is_stale(&self, response: &WireResponse, query_result: Option<&QueryResult>) -> bool {
        match self {
            StaleSignal::ResultFlag => query_result.map_or(false, |result| result.is_stale),
            StaleSignal::Header(name) => response
                .header(name)
                .map_or(false, |value| value.trim().eq_ignore_ascii_case("true")),
        }
    }
}

impl Default for StaleSignal {
    fn default() -> Self {
        StaleSignal::ResultFlag
    }
}

/// Configuration for a session and its batch executor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of stale-triggered re-requests per flush.
    pub max_stale_retries: u32,
    /// Pause before each stale-triggered re-request.
    pub stale_retry_delay: Duration,
    /// Staleness detection signal.
    pub stale_signal: StaleSignal,
    /// Maximum number of flushes over the session's lifetime; retry rounds
    /// within a flush are free.
    pub max_requests_per_session: u32,
    /// Property that receives the document key during conversion.
    pub identity_property: Option<String>,
}

impl SessionConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_stale_retries: 3,
            stale_retry_delay: Duration::from_millis(100),
            stale_signal: StaleSignal::ResultFlag,
            max_requests_per_session: 30,
            identity_property: Some("id".to_string()),
        }
    }

    /// Sets the stale retry ceiling.
    pub fn with_max_stale_retries(mut self, retries: u32) -> Self {
        self.max_stale_retries = retries;
        self
    }

    /// Sets the pause before each stale retry.
    pub fn with_stale_retry_delay(mut self, delay: Duration) -> Self {
        self.stale_retry_delay = delay;
        self
    }

    /// Sets the staleness detection signal.
    pub fn with_stale_signal(mut self, signal: StaleSignal) -> Self {
        self.stale_signal = signal;
        self
    }

    /// Sets the request budget.
    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests_per_session = max;
        self
    }

    /// Sets the identity property, or disables identity injection with `None`.
    pub fn with_identity_property(mut self, property: Option<&str>) -> Self {
        self.identity_property = property.map(str::to_string);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Server URL (e.g. `http://localhost:8080`).
    pub base_url: String,
    /// Database the requests are scoped to; `None` targets the server root.
    pub database: Option<String>,
    /// Timeout handed to the HTTP client for each round trip.
    pub timeout: Duration,
}

impl TransportConfig {
    /// Creates a transport configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Scopes requests to a database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
