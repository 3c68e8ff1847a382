//! # Docket Client
//!
//! Lazy operation batching for the Docket document database.
//!
//! Reads are registered on a [`Session`] without being executed. The first
//! time any of their values is needed, every queued read is sent to the
//! server in one multi-get round trip and the responses are handed back to
//! the operations by position. Queries that refuse stale results are
//! re-requested, alone, until their index has caught up or the retry limit
//! is reached.
//!
//! This crate provides:
//! - `Session`, the unit of work, and its lazy registration surface
//! - Lazy operation variants (load, multi-load, prefix load, query, count,
//!   suggest) behind the `LazyOperation` trait
//! - `BatchExecutor`, which multiplexes pending operations into one
//!   multi-get and retries stale results
//! - Scoped conversion context and the session's document tracker
//! - Transport gateway abstraction with HTTP and mock implementations
//!
//! ## Key Invariants
//!
//! - One gateway call per flush round, never one per operation
//! - Responses pair with operations by batch position
//! - Only stale operations that refuse stale reads are re-requested
//! - A transport failure leaves the pending queue untouched
//! - One operation's bad payload never fails its siblings
//!
//! ## Example
//!
//! ```rust,ignore
//! use docket_client::{Session, SessionConfig};
//! use docket_protocol::IndexQuery;
//!
//! let session = Session::new(gateway, SessionConfig::default());
//! let alice = session.lazily().load::<User>("users/1");
//! let admins = session
//!     .lazily()
//!     .query::<User>("users/by_role", IndexQuery::new("role:admin").wait_for_non_stale_results());
//!
//! // One round trip for both
//! let alice = session.value(&alice)?;
//! let admins = session.value(&admins)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod executor;
mod http;
mod operation;
mod session;
mod tracker;
mod transport;

pub use config::{SessionConfig, StaleSignal, TransportConfig};
pub use context::{ContextGuard, ConversionContext, ConversionFrame, ScopeBinding};
pub use error::{ClientError, ClientResult};
pub use executor::{BatchExecutor, FlushReport, ResponseTimeItem};
pub use http::{HttpClient, HttpReply, HttpTransport, LoopbackClient, LoopbackServer};
pub use operation::{
    Consistency, CountOperation, LazyOperation, LoadOperation, MultiLoadOperation, OperationId,
    OperationState, Outcome, QueryOperation, StartsWithOperation, SuggestOperation,
};
pub use session::{LazySessionOperations, Lazy, Materialized, Session, SessionStats};
pub use tracker::{DocumentTracker, TrackedDocument};
pub use transport::{MockTransport, TransportGateway};

// Re-export protocol types for convenience
pub use docket_protocol::{
    IndexQuery, QueryResult, StartsWithQuery, StringDistance, SuggestionQuery, WireRequest,
    WireResponse,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
