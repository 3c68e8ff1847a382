//! HTTP transport implementation.
//!
//! The batch is posted as one JSON array to the server's multi-get endpoint
//! and the reply is a JSON array of responses. The actual HTTP client is
//! abstracted via a trait so that any HTTP library, or an in-process server,
//! can carry the bytes.

use crate::config::TransportConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::TransportGateway;
use docket_protocol::{
    decode_responses, encode_requests, WireRequest, WireResponse, MULTI_GET_PATH,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Raw reply of an HTTP POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Creates a `200 OK` reply.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the reply.
    ///
    /// `Err` means no reply was received at all.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<HttpReply, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based transport gateway.
pub struct HttpTransport<C: HttpClient> {
    config: TransportConfig,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(config: TransportConfig, client: C) -> Self {
        Self {
            config,
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the URL batches are posted to.
    pub fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match &self.config.database {
            Some(database) => format!("{}/databases/{}{}", base, database, MULTI_GET_PATH),
            None => format!("{}{}", base, MULTI_GET_PATH),
        }
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<C: HttpClient> TransportGateway for HttpTransport<C> {
    fn multi_get(&self, requests: &[WireRequest]) -> ClientResult<Vec<WireResponse>> {
        if !self.is_connected() {
            return Err(ClientError::transport_retryable("not connected"));
        }

        let body = encode_requests(requests)?;
        let url = self.endpoint();
        tracing::trace!(url = %url, requests = requests.len(), "posting multi-get batch");

        let reply = self
            .client
            .post(&url, body, self.config.timeout)
            .map_err(|e| {
                self.set_error(&e);
                ClientError::transport_retryable(e)
            })?;

        if !(200..300).contains(&reply.status) {
            let message = format!(
                "multi-get failed with status {}: {}",
                reply.status,
                String::from_utf8_lossy(&reply.body)
            );
            self.set_error(&message);
            return Err(ClientError::Transport {
                message,
                retryable: reply.status >= 500,
            });
        }

        self.clear_error();
        Ok(decode_responses(&reply.body)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> ClientResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST to `path` and returns the reply.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<HttpReply, String>;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<HttpReply, String> {
        // Strip scheme and host
        let path = match url.find("://") {
            Some(i) => {
                let rest = &url[i + 3..];
                rest.find('/').map(|j| &rest[j..]).unwrap_or("/")
            }
            None => url,
        };
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
