//! Term suggestion queries.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// String distance algorithm used to rank suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringDistance {
    /// Server default.
    Default,
    /// Levenshtein edit distance.
    Levenshtein,
    /// Jaro-Winkler distance.
    JaroWinkler,
    /// N-gram distance.
    NGram,
}

impl fmt::Display for StringDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StringDistance::Default => "Default",
            StringDistance::Levenshtein => "Levenshtein",
            StringDistance::JaroWinkler => "JaroWinkler",
            StringDistance::NGram => "NGram",
        };
        f.write_str(name)
    }
}

impl FromStr for StringDistance {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Default" => Ok(StringDistance::Default),
            "Levenshtein" => Ok(StringDistance::Levenshtein),
            "JaroWinkler" => Ok(StringDistance::JaroWinkler),
            "NGram" => Ok(StringDistance::NGram),
            other => Err(ProtocolError::invalid_payload(format!(
                "unknown string distance '{}'",
                other
            ))),
        }
    }
}

/// Asks an index for terms close to `term` in `field`.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionQuery {
    /// Term to find neighbours for.
    pub term: String,
    /// Field whose terms are searched.
    pub field: String,
    /// Maximum number of suggestions.
    pub max_suggestions: u32,
    /// Minimum similarity in `0.0..=1.0`.
    pub accuracy: Option<f32>,
    /// Distance algorithm.
    pub distance: Option<StringDistance>,
}

impl SuggestionQuery {
    /// Creates a suggestion query returning at most 15 terms.
    pub fn new(term: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            field: field.into(),
            max_suggestions: 15,
            accuracy: None,
            distance: None,
        }
    }

    /// Sets the maximum number of suggestions.
    #[must_use]
    pub fn with_max_suggestions(mut self, max: u32) -> Self {
        self.max_suggestions = max;
        self
    }

    /// Sets the minimum accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the distance algorithm.
    #[must_use]
    pub fn with_distance(mut self, distance: StringDistance) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// Suggested terms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuggestionQueryResult {
    /// Suggestions, best first.
    pub suggestions: Vec<String>,
}

impl SuggestionQueryResult {
    /// Parses a suggestion payload.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| ProtocolError::invalid_payload(format!("suggestion result: {}", e)))
    }
}
