//! Server configuration.

use docket_protocol::DEFAULT_PAGE_SIZE;

/// Configuration for the document server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database name accepted under `/databases/<name>/multi_get`.
    pub database: String,
    /// Stale reads an index serves before catching up on its own; `0`
    /// disables automatic catch-up.
    pub stale_reads_before_catch_up: u32,
    /// Upper bound for a query's page size.
    pub max_page_size: u32,
    /// Page size used when a query does not set one.
    pub default_page_size: u32,
    /// Whether responses carry the `Temp-Request-Time` header.
    pub report_request_time: bool,
}

impl ServerConfig {
    /// Creates a configuration serving `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            stale_reads_before_catch_up: 0,
            max_page_size: 1024,
            default_page_size: DEFAULT_PAGE_SIZE,
            report_request_time: true,
        }
    }

    /// Lets indexes catch up after serving `reads` stale reads.
    pub fn with_stale_reads_before_catch_up(mut self, reads: u32) -> Self {
        self.stale_reads_before_catch_up = reads;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Enables or disables request time reporting.
    pub fn with_request_time(mut self, report: bool) -> Self {
        self.report_request_time = report;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
