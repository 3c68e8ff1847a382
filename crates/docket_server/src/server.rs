//! Main document server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::index::IndexRegistry;
use crate::store::DocumentStore;
use docket_protocol::{decode_requests, encode_responses, WireRequest, WireResponse, MULTI_GET_PATH};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The document server.
///
/// Keeps documents and indexes in memory and answers multi-get batches. Index
/// staleness is simulated: writes are invisible to an index until it catches
/// up, either explicitly through [`DocumentServer::catch_up_indexes`] or after
/// the configured number of stale reads.
///
/// # Example
///
/// ```
/// use docket_server::{DocumentServer, ServerConfig};
/// use docket_protocol::WireRequest;
/// use serde_json::json;
///
/// let server = DocumentServer::new(ServerConfig::default());
/// server.put("users/1", json!({"name": "Alice"})).unwrap();
///
/// let responses = server.handle_multi_get(&[
///     WireRequest::new("/docs").with_param("id", "users/1"),
/// ]);
/// assert_eq!(responses[0].status(), 200);
/// ```
pub struct DocumentServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    batches: AtomicU64,
}

impl DocumentServer {
    /// Creates an empty server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(DocumentStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let indexes = Arc::new(IndexRegistry::new());
        let context = Arc::new(HandlerContext::new(config, store, indexes));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            batches: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Stores a document and returns its etag.
    pub fn put(&self, key: &str, document: Value) -> ServerResult<u64> {
        self.context.store.put(key, document)
    }

    /// Deletes a document.
    pub fn delete(&self, key: &str) -> bool {
        self.context.store.delete(key)
    }

    /// Returns a document with its metadata.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.context.store.get(key)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.context.store.len()
    }

    /// Creates an index over a collection.
    pub fn create_index(&self, name: &str, collection: &str) -> ServerResult<()> {
        self.context
            .indexes
            .create(name, collection, &self.context.store)
    }

    /// Brings every index up to date.
    pub fn catch_up_indexes(&self) {
        self.context.indexes.catch_up_all(&self.context.store);
    }

    /// Returns whether an index is stale, or `None` if it does not exist.
    pub fn is_index_stale(&self, name: &str) -> Option<bool> {
        self.context.indexes.is_stale(name, &self.context.store)
    }

    /// Index names.
    pub fn index_names(&self) -> Vec<String> {
        self.context.indexes.names()
    }

    /// Number of multi-get batches answered.
    pub fn batches_served(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }

    /// Answers a batch, one response per request, in request order.
    pub fn handle_multi_get(&self, requests: &[WireRequest]) -> Vec<WireResponse> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(requests = requests.len(), "handling multi-get");
        requests.iter().map(|r| self.handler.handle(r)).collect()
    }

    /// Handles an HTTP POST carrying an encoded batch.
    ///
    /// Returns the status and body of the reply. Accepts `/multi_get` and
    /// `/databases/<name>/multi_get` for the configured database.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<(u16, Vec<u8>), String> {
        if !self.accepts(path) {
            return Ok((404, format!("no endpoint at {}", path).into_bytes()));
        }
        let requests = match decode_requests(body) {
            Ok(requests) => requests,
            Err(e) => return Ok((400, e.to_string().into_bytes())),
        };
        let responses = self.handle_multi_get(&requests);
        encode_responses(&responses)
            .map(|bytes| (200, bytes))
            .map_err(|e| e.to_string())
    }

    fn accepts(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        if path == MULTI_GET_PATH {
            return true;
        }
        path.strip_prefix("/databases/")
            .and_then(|rest| rest.strip_suffix(MULTI_GET_PATH))
            .map_or(false, |database| database.eq_ignore_ascii_case(&self.config().database))
    }
}
