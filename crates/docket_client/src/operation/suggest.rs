//! Term suggestions.

use super::{check_status, Consistency, LazyOperation, OperationId, OperationState};
use crate::config::StaleSignal;
use crate::error::ClientResult;
use docket_protocol::{SuggestionQuery, SuggestionQueryResult, WireRequest, WireResponse};
use serde_json::Value;

/// Asks an index for terms similar to a given one.
#[derive(Debug, Clone)]
pub struct SuggestOperation {
    state: OperationState,
    index: String,
    query: SuggestionQuery,
}

impl SuggestOperation {
    /// Creates a suggestion request against `index`.
    pub fn new(
        id: OperationId,
        index: impl Into<String>,
        query: SuggestionQuery,
        stale_signal: StaleSignal,
    ) -> Self {
        let index = index.into();
        Self {
            state: OperationState::new(
                id,
                format!("suggest {} '{}'", index, query.term),
                Consistency::AllowStale,
                stale_signal,
            ),
            index,
            query,
        }
    }
}

impl LazyOperation for SuggestOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        WireRequest::new(format!("/suggest/{}", self.index))
            .with_param("term", &self.query.term)
            .with_param("field", &self.query.field)
            .with_param("max", self.query.max_suggestions)
            .with_optional_param("accuracy", self.query.accuracy)
            .with_optional_param("distance", self.query.distance)
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, false)?;
        let suggestions = SuggestionQueryResult::from_value(response.result())
            .map_err(|e| self.state.deserialization_error(e))?;
        let stale = self.state.detect_stale(response, None);
        let terms = suggestions.suggestions.into_iter().map(Value::String).collect();
        self.state.succeed(Value::Array(terms), stale);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_protocol::StringDistance;
    use serde_json::json;

    #[test]
    fn suggest_request() {
        let op = SuggestOperation::new(
            OperationId::new(1),
            "users",
            SuggestionQuery::new("jhon", "name")
                .with_max_suggestions(5)
                .with_distance(StringDistance::Levenshtein),
            StaleSignal::default(),
        );
        let request = op.create_request();
        assert_eq!(request.url(), "/suggest/users");
        assert_eq!(request.param("term"), Some("jhon"));
        assert_eq!(request.param("max"), Some("5"));
        assert_eq!(request.param("distance"), Some("Levenshtein"));
        assert_eq!(request.param("accuracy"), None);
    }

    #[test]
    fn suggest_result() {
        let mut op = SuggestOperation::new(
            OperationId::new(1),
            "users",
            SuggestionQuery::new("jhon", "name"),
            StaleSignal::default(),
        );
        op.handle_response(&WireResponse::ok(json!({"suggestions": ["john", "joan"]})))
            .unwrap();
        assert_eq!(op.result().unwrap(), &json!(["john", "joan"]));

        assert!(op
            .handle_response(&WireResponse::ok(json!({"terms": []})))
            .is_err());
    }
}
