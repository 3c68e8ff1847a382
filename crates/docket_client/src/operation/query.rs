//! Index queries.

use super::{check_status, Consistency, LazyOperation, OperationId, OperationState};
use crate::config::StaleSignal;
use crate::context::{ContextGuard, ScopeBinding};
use crate::error::ClientResult;
use docket_protocol::{IndexQuery, QueryResult, WireRequest, WireResponse};
use serde_json::Value;

fn consistency_of(query: &IndexQuery) -> Consistency {
    if query.wait_for_non_stale_results {
        Consistency::WaitForNonStale
    } else {
        Consistency::AllowStale
    }
}

fn index_request(index: &str, query: &IndexQuery) -> WireRequest {
    WireRequest::new(format!("/indexes/{}", index)).with_params(query.to_params())
}

/// Queries an index and materializes the matching documents.
#[derive(Debug, Clone)]
pub struct QueryOperation {
    state: OperationState,
    index: String,
    query: IndexQuery,
    scope: ScopeBinding,
}

impl QueryOperation {
    /// Creates a query against `index`.
    ///
    /// The operation waits for non-stale results when the query asks for them.
    pub fn new(
        id: OperationId,
        index: impl Into<String>,
        query: IndexQuery,
        scope: ScopeBinding,
        stale_signal: StaleSignal,
    ) -> Self {
        let index = index.into();
        Self {
            state: OperationState::new(
                id,
                format!("query {} '{}'", index, query.query),
                consistency_of(&query),
                stale_signal,
            ),
            index,
            query,
            scope,
        }
    }

    /// Index name.
    pub fn index(&self) -> &str {
        &self.index
    }
}

impl LazyOperation for QueryOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        index_request(&self.index, &self.query)
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, false)?;
        let query_result = QueryResult::from_value(response.result())
            .map_err(|e| self.state.deserialization_error(e))?;

        let context = self.scope.context();
        for include in &query_result.includes {
            context.convert_include(include)?;
        }
        let documents = query_result
            .results
            .iter()
            .map(|doc| context.convert_document(doc))
            .collect::<ClientResult<Vec<_>>>()?;

        let stale = self.state.detect_stale(response, Some(&query_result));
        self.state
            .succeed_query(Value::Array(documents), query_result, stale);
        Ok(())
    }

    fn enter_context(&self) -> Option<ContextGuard> {
        Some(self.scope.enter(self.state.id()))
    }
}

/// Counts the matches of an index query without fetching documents.
#[derive(Debug, Clone)]
pub struct CountOperation {
    state: OperationState,
    index: String,
    query: IndexQuery,
}

impl CountOperation {
    /// Creates a count against `index`.
    pub fn new(
        id: OperationId,
        index: impl Into<String>,
        query: IndexQuery,
        stale_signal: StaleSignal,
    ) -> Self {
        let index = index.into();
        let query = query.with_page_size(0);
        Self {
            state: OperationState::new(
                id,
                format!("count {} '{}'", index, query.query),
                consistency_of(&query),
                stale_signal,
            ),
            index,
            query,
        }
    }
}

impl LazyOperation for CountOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        index_request(&self.index, &self.query)
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, false)?;
        let query_result = QueryResult::from_value(response.result())
            .map_err(|e| self.state.deserialization_error(e))?;
        let stale = self.state.detect_stale(response, Some(&query_result));
        let total = Value::from(query_result.total_results);
        self.state.succeed_query(total, query_result, stale);
        Ok(())
    }
}
