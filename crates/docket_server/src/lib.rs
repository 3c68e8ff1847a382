//! # Docket Server
//!
//! In-memory reference server for the Docket client.
//!
//! This crate provides:
//! - A document store with per-write etags and `@metadata`
//! - Indexes over collections with simulated asynchronous indexing
//! - Handlers for loads, prefix loads, multi-loads with includes, index
//!   queries and term suggestions
//! - The multi-get endpoint, answering one response per request
//!
//! # Staleness
//!
//! Every write moves the store etag forward. An index only sees the writes
//! up to its last catch-up, so queries against it report `is_stale` until
//! [`DocumentServer::catch_up_indexes`] runs or the index has served
//! [`ServerConfig::stale_reads_before_catch_up`] stale reads.
//!
//! # Example
//!
//! ```
//! use docket_protocol::WireRequest;
//! use docket_server::{DocumentServer, ServerConfig};
//! use serde_json::json;
//!
//! let server = DocumentServer::new(ServerConfig::default());
//! server.put("users/1", json!({"name": "Alice"})).unwrap();
//!
//! let responses = server.handle_multi_get(&[
//!     WireRequest::new("/docs").with_param("id", "users/1"),
//!     WireRequest::new("/docs").with_param("id", "users/2"),
//! ]);
//! assert_eq!(responses.len(), 2);
//! assert_eq!(responses[0].status(), 200);
//! assert_eq!(responses[1].status(), 404);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod index;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use index::{Index, IndexRegistry};
pub use server::DocumentServer;
pub use store::{collection_of, DocumentStore, StoredDocument};
