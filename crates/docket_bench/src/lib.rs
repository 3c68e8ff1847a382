//! Benchmark utilities.

use docket_client::{
    HttpReply, HttpTransport, LoopbackClient, LoopbackServer, Session, SessionConfig,
    TransportConfig,
};
use docket_protocol::{WireRequest, WireResponse};
use docket_server::{DocumentServer, ServerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Gateway used by the benchmarks.
pub type BenchGateway = HttpTransport<LoopbackClient<ServerEndpoint>>;

/// Routes loopback posts to an in-memory server.
pub struct ServerEndpoint {
    server: Arc<DocumentServer>,
}

impl LoopbackServer for ServerEndpoint {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<HttpReply, String> {
        self.server
            .handle_post(path, body)
            .map(|(status, body)| HttpReply { status, body })
    }
}

/// Generate a server holding `count` user documents and a `users` index.
pub fn seeded_server(count: usize, config: ServerConfig) -> Arc<DocumentServer> {
    let server = Arc::new(DocumentServer::new(config));
    let _ = server.create_index("users", "users");
    for i in 0..count {
        let _ = server.put(
            &user_key(i),
            json!({"name": format!("user {}", i), "role": if i % 2 == 0 { "admin" } else { "user" }}),
        );
    }
    server.catch_up_indexes();
    server
}

/// Key of the `i`th generated user.
pub fn user_key(i: usize) -> String {
    format!("users/{}", i)
}

/// Open a session with no request budget and no retry delay.
pub fn connect(server: &Arc<DocumentServer>) -> Session<BenchGateway> {
    let transport = HttpTransport::new(
        TransportConfig::new("http://localhost").with_database(server.config().database.clone()),
        LoopbackClient::new(ServerEndpoint {
            server: Arc::clone(server),
        }),
    );
    let config = SessionConfig::new()
        .with_max_requests(u32::MAX)
        .with_stale_retry_delay(Duration::ZERO);
    Session::new(transport, config)
}

/// Generate a batch of load requests.
pub fn load_requests(count: usize) -> Vec<WireRequest> {
    (0..count)
        .map(|i| WireRequest::new("/docs").with_param("id", user_key(i)))
        .collect()
}

/// Generate a batch of document responses.
pub fn load_responses(count: usize) -> Vec<WireResponse> {
    (0..count)
        .map(|i| {
            WireResponse::ok(json!({
                "name": format!("user {}", i),
                "@metadata": {"@id": user_key(i), "@etag": i},
            }))
        })
        .collect()
}
