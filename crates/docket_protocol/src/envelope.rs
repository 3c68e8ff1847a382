//! Multi-get envelope codec.
//!
//! A batch travels as one JSON array of requests; the server answers with a
//! JSON array of responses in the same order.

use crate::error::{ProtocolError, ProtocolResult};
use crate::request::WireRequest;
use crate::response::WireResponse;

/// Path of the multi-get endpoint, relative to the database root.
pub const MULTI_GET_PATH: &str = "/multi_get";

/// Encodes a batch of requests.
pub fn encode_requests(requests: &[WireRequest]) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(requests).map_err(|e| ProtocolError::encoding(e.to_string()))
}

/// Decodes a batch of requests.
pub fn decode_requests(bytes: &[u8]) -> ProtocolResult<Vec<WireRequest>> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::decoding(e.to_string()))
}

/// Encodes a batch of responses.
pub fn encode_responses(responses: &[WireResponse]) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(responses).map_err(|e| ProtocolError::encoding(e.to_string()))
}

/// Decodes a batch of responses.
pub fn decode_responses(bytes: &[u8]) -> ProtocolResult<Vec<WireResponse>> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::decoding(e.to_string()))
}
