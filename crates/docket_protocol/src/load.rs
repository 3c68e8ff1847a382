//! Multi-document load results.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of loading several documents by id.
///
/// `results` is positional: entry `i` answers the `i`-th requested id and is
/// `null` when that document does not exist.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiLoadResult {
    /// Requested documents.
    pub results: Vec<Value>,
    /// Documents pulled in through include paths.
    #[serde(default)]
    pub includes: Vec<Value>,
}

impl MultiLoadResult {
    /// Parses a multi-load payload.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        if !value.is_object() {
            return Err(ProtocolError::invalid_payload(
                "multi-load result must be an object",
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ProtocolError::invalid_payload(format!("multi-load result: {}", e)))
    }

    /// Converts to a JSON payload.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
