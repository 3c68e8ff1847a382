//! # Docket Protocol
//!
//! Wire types and payload records for the Docket document database client.
//!
//! This crate provides:
//! - `WireRequest` / `WireResponse`, one request and one response inside a
//!   multi-get batch
//! - The multi-get envelope codec (JSON arrays of requests and responses)
//! - Payload records parsed by lazy operations (`QueryResult`,
//!   `MultiLoadResult`, `SuggestionQueryResult`)
//! - Request builders for index queries and suggestions
//! - Document metadata helpers
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod envelope;
mod error;
mod load;
mod query;
mod request;
mod response;
mod suggest;

pub use document::{
    document_collection, document_etag, document_id, ENTITY_NAME_KEY, ETAG_KEY, ID_KEY,
    METADATA_KEY,
};
pub use envelope::{
    decode_requests, decode_responses, encode_requests, encode_responses, MULTI_GET_PATH,
};
pub use error::{ProtocolError, ProtocolResult};
pub use load::MultiLoadResult;
pub use query::{IndexQuery, QueryResult, StartsWithQuery, DEFAULT_PAGE_SIZE};
pub use request::WireRequest;
pub use response::{WireResponse, INDEX_STALE_HEADER, REQUEST_TIME_HEADER};
pub use suggest::{StringDistance, SuggestionQuery, SuggestionQueryResult};
