//! Document loads by key and by key prefix.

use super::{check_status, Consistency, LazyOperation, OperationId, OperationState};
use crate::config::StaleSignal;
use crate::context::{ContextGuard, ScopeBinding};
use crate::error::ClientResult;
use docket_protocol::{MultiLoadResult, StartsWithQuery, WireRequest, WireResponse};
use serde_json::Value;

/// Loads one document by key.
///
/// A `404` materializes as `null`.
#[derive(Debug, Clone)]
pub struct LoadOperation {
    state: OperationState,
    key: String,
    scope: ScopeBinding,
}

impl LoadOperation {
    /// Creates a load of `key`.
    pub fn new(
        id: OperationId,
        key: impl Into<String>,
        scope: ScopeBinding,
        stale_signal: StaleSignal,
    ) -> Self {
        let key = key.into();
        Self {
            state: OperationState::new(
                id,
                format!("load {}", key),
                Consistency::AllowStale,
                stale_signal,
            ),
            key,
            scope,
        }
    }

    /// Creates a load whose document is already known.
    pub fn materialized(
        id: OperationId,
        key: impl Into<String>,
        scope: ScopeBinding,
        document: Value,
    ) -> Self {
        let mut operation = Self::new(id, key, scope, StaleSignal::default());
        operation.state.succeed(document, false);
        operation
    }

    /// Document key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl LazyOperation for LoadOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        WireRequest::new("/docs").with_param("id", &self.key)
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, true)?;
        let stale = self.state.detect_stale(response, None);
        if response.is_not_found() {
            self.state.succeed(Value::Null, stale);
            return Ok(());
        }
        let document = self.scope.context().convert_document(response.result())?;
        self.state.succeed(document, stale);
        Ok(())
    }

    fn enter_context(&self) -> Option<ContextGuard> {
        Some(self.scope.enter(self.state.id()))
    }
}

/// Loads several documents by key in one request, with optional includes.
///
/// The result is an array positionally matching the keys; missing documents
/// are `null`. Included documents are tracked but not returned.
#[derive(Debug, Clone)]
pub struct MultiLoadOperation {
    state: OperationState,
    keys: Vec<String>,
    includes: Vec<String>,
    scope: ScopeBinding,
}

impl MultiLoadOperation {
    /// Creates a load of `keys`, pulling in the documents referenced by
    /// `includes`.
    pub fn new(
        id: OperationId,
        keys: Vec<String>,
        includes: Vec<String>,
        scope: ScopeBinding,
        stale_signal: StaleSignal,
    ) -> Self {
        Self {
            state: OperationState::new(
                id,
                format!("load {} documents", keys.len()),
                Consistency::AllowStale,
                stale_signal,
            ),
            keys,
            includes,
            scope,
        }
    }

    /// Requested keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl LazyOperation for MultiLoadOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        WireRequest::new("/queries/")
            .with_params(self.keys.iter().map(|key| ("id", key.as_str())))
            .with_params(self.includes.iter().map(|path| ("include", path.as_str())))
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, false)?;
        let loaded = MultiLoadResult::from_value(response.result())
            .map_err(|e| self.state.deserialization_error(e))?;
        if loaded.results.len() != self.keys.len() {
            return Err(self.state.deserialization_error(format!(
                "expected {} results, got {}",
                self.keys.len(),
                loaded.results.len()
            )));
        }

        let context = self.scope.context();
        for include in &loaded.includes {
            context.convert_include(include)?;
        }
        let documents = loaded
            .results
            .iter()
            .map(|doc| context.convert_document(doc))
            .collect::<ClientResult<Vec<_>>>()?;

        let stale = self.state.detect_stale(response, None);
        self.state.succeed(Value::Array(documents), stale);
        Ok(())
    }

    fn enter_context(&self) -> Option<ContextGuard> {
        Some(self.scope.enter(self.state.id()))
    }
}

/// Loads the documents whose key starts with a prefix.
#[derive(Debug, Clone)]
pub struct StartsWithOperation {
    state: OperationState,
    query: StartsWithQuery,
    scope: ScopeBinding,
}

impl StartsWithOperation {
    /// Creates a prefix load.
    pub fn new(
        id: OperationId,
        query: StartsWithQuery,
        scope: ScopeBinding,
        stale_signal: StaleSignal,
    ) -> Self {
        Self {
            state: OperationState::new(
                id,
                format!("load starting with {}", query.prefix),
                Consistency::AllowStale,
                stale_signal,
            ),
            query,
            scope,
        }
    }
}

impl LazyOperation for StartsWithOperation {
    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn create_request(&self) -> WireRequest {
        WireRequest::new("/docs").with_params(self.query.to_params())
    }

    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()> {
        check_status(response, false)?;
        let raw = response
            .result()
            .as_array()
            .ok_or_else(|| self.state.deserialization_error("expected an array of documents"))?;

        let context = self.scope.context();
        let documents = raw
            .iter()
            .map(|doc| context.convert_document(doc))
            .collect::<ClientResult<Vec<_>>>()?;

        let stale = self.state.detect_stale(response, None);
        self.state.succeed(Value::Array(documents), stale);
        Ok(())
    }

    fn enter_context(&self) -> Option<ContextGuard> {
        Some(self.scope.enter(self.state.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConversionContext;
    use crate::error::ClientError;
    use crate::tracker::DocumentTracker;
    use serde_json::json;
    use std::sync::Arc;

    fn scope() -> ScopeBinding {
        let context = Arc::new(ConversionContext::new(Arc::new(DocumentTracker::new())));
        ScopeBinding::new(context, "User", Some("id".to_string()))
    }

    fn user(key: &str, name: &str) -> Value {
        json!({"name": name, "@metadata": {"@id": key, "@etag": 1}})
    }

    fn handle(op: &mut dyn LazyOperation, response: &WireResponse) -> ClientResult<()> {
        let _guard = op.enter_context();
        op.handle_response(response)
    }

    #[test]
    fn load_request_and_result() {
        let mut op = LoadOperation::new(OperationId::new(1), "users/1", scope(), StaleSignal::default());
        let request = op.create_request();
        assert_eq!(request.url(), "/docs");
        assert_eq!(request.param("id"), Some("users/1"));

        handle(&mut op, &WireResponse::ok(user("users/1", "Alice"))).unwrap();
        assert_eq!(op.result().unwrap(), &json!({"name": "Alice", "id": "users/1"}));
        assert_eq!(op.query_result().unwrap(), None);
        assert!(op.scope.context().tracker().is_loaded("users/1"));
    }

    #[test]
    fn load_missing_document_is_null() {
        let mut op = LoadOperation::new(OperationId::new(1), "users/9", scope(), StaleSignal::default());
        handle(&mut op, &WireResponse::not_found()).unwrap();
        assert_eq!(op.result().unwrap(), &Value::Null);
    }

    #[test]
    fn load_outside_scope_fails() {
        let mut op = LoadOperation::new(OperationId::new(1), "users/1", scope(), StaleSignal::default());
        let err = op.handle_response(&WireResponse::ok(user("users/1", "A"))).unwrap_err();
        assert_eq!(err, ClientError::ContextNotActive);
    }

    #[test]
    fn load_server_error() {
        let mut op = LoadOperation::new(OperationId::new(1), "users/1", scope(), StaleSignal::default());
        let err = handle(&mut op, &WireResponse::error(500, "boom")).unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
    }

    #[test]
    fn materialized_load() {
        let op = LoadOperation::materialized(OperationId::new(1), "users/1", scope(), json!({"id": "users/1"}));
        assert!(op.state().is_consumed());
        assert_eq!(op.key(), "users/1");
    }

    #[test]
    fn multi_load_positional_with_includes() {
        let scope = scope();
        let mut op = MultiLoadOperation::new(
            OperationId::new(2),
            vec!["users/1".into(), "users/2".into()],
            vec!["companyId".into()],
            scope.clone(),
            StaleSignal::default(),
        );
        let request = op.create_request();
        assert_eq!(request.url(), "/queries/");
        assert_eq!(request.params("id").collect::<Vec<_>>(), vec!["users/1", "users/2"]);
        assert_eq!(request.param("include"), Some("companyId"));

        let payload = json!({
            "results": [user("users/1", "Alice"), null],
            "includes": [{"name": "Acme", "@metadata": {"@id": "companies/1"}}]
        });
        handle(&mut op, &WireResponse::ok(payload)).unwrap();

        let result = op.result().unwrap().as_array().unwrap().clone();
        assert_eq!(result[0]["name"], "Alice");
        assert!(result[1].is_null());
        assert!(scope.context().tracker().is_loaded("companies/1"));
    }

    #[test]
    fn multi_load_length_mismatch() {
        let mut op = MultiLoadOperation::new(
            OperationId::new(2),
            vec!["users/1".into(), "users/2".into()],
            Vec::new(),
            scope(),
            StaleSignal::default(),
        );
        let err = handle(&mut op, &WireResponse::ok(json!({"results": [null]}))).unwrap_err();
        assert!(matches!(err, ClientError::Deserialization { .. }));
    }

    #[test]
    fn starts_with() {
        let mut op = StartsWithOperation::new(
            OperationId::new(3),
            StartsWithQuery::new("users/"),
            scope(),
            StaleSignal::default(),
        );
        assert_eq!(op.create_request().param("startsWith"), Some("users/"));

        handle(&mut op, &WireResponse::ok(json!([user("users/1", "A"), user("users/2", "B")]))).unwrap();
        assert_eq!(op.result().unwrap().as_array().unwrap().len(), 2);

        let err = handle(&mut op, &WireResponse::ok(json!({"results": []}))).unwrap_err();
        assert!(matches!(err, ClientError::Deserialization { .. }));
    }
}
