//! Sessions and typed lazy handles.

use crate::config::SessionConfig;
use crate::context::{ConversionContext, ScopeBinding};
use crate::error::{ClientError, ClientResult};
use crate::executor::{BatchExecutor, FlushReport};
use crate::operation::{
    CountOperation, LazyOperation, LoadOperation, MultiLoadOperation, OperationId,
    QueryOperation, StartsWithOperation, SuggestOperation,
};
use crate::tracker::DocumentTracker;
use crate::transport::TransportGateway;
use docket_protocol::{IndexQuery, StartsWithQuery, SuggestionQuery};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

type Callback = Box<dyn FnOnce(&Value) + Send>;

/// Handle to a value that is loaded on first access.
pub struct Lazy<T> {
    id: OperationId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Lazy<T> {
    fn new(id: OperationId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Id of the underlying operation.
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T: DeserializeOwned> Lazy<T> {
    /// Returns the value, flushing the session if needed.
    pub fn value<G: TransportGateway>(&self, session: &Session<G>) -> ClientResult<T> {
        session.value(self)
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Lazy<T> {}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("id", &self.id).finish()
    }
}

/// A materialized value and whether it came from a stale index.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized<T> {
    /// The value.
    pub value: T,
    /// True when the index had not caught up, even after retries.
    pub stale: bool,
}

/// Cumulative statistics of a session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Flushes that sent at least one request.
    pub flushes: u64,
    /// Multi-get round trips.
    pub gateway_calls: u64,
    /// Operations executed.
    pub operations_executed: u64,
    /// Stale-triggered re-requests.
    pub stale_retries: u64,
    /// Results that stayed stale.
    pub stale_results: u64,
    /// Last flush error message.
    pub last_error: Option<String>,
}

/// A unit of work against the database.
///
/// Reads registered through [`Session::lazily`] are queued and sent together
/// on the next flush, which happens when any of their values is requested.
pub struct Session<G: TransportGateway> {
    id: Uuid,
    gateway: G,
    executor: BatchExecutor,
    context: Arc<ConversionContext>,
    tracker: Arc<DocumentTracker>,
    callbacks: Mutex<HashMap<OperationId, Callback>>,
    stats: RwLock<SessionStats>,
}

impl<G: TransportGateway> Session<G> {
    /// Creates a new session.
    pub fn new(gateway: G, config: SessionConfig) -> Self {
        let tracker = Arc::new(DocumentTracker::new());
        Self {
            id: Uuid::new_v4(),
            gateway,
            executor: BatchExecutor::new(config),
            context: Arc::new(ConversionContext::new(Arc::clone(&tracker))),
            tracker,
            callbacks: Mutex::new(HashMap::new()),
            stats: RwLock::new(SessionStats::default()),
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        self.executor.config()
    }

    /// Returns the lazy registration surface.
    pub fn lazily(&self) -> LazySessionOperations<'_, G> {
        LazySessionOperations { session: self }
    }

    /// Documents materialized by this session.
    pub fn tracker(&self) -> &DocumentTracker {
        &self.tracker
    }

    /// Number of requests made; one per flush that reached the server.
    pub fn number_of_requests(&self) -> u32 {
        self.executor.requests_made()
    }

    /// Number of queued operations.
    pub fn pending_count(&self) -> usize {
        self.executor.pending_count()
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Sends every queued operation in one batch.
    ///
    /// On-evaluate callbacks of the flushed operations run afterwards, in
    /// registration order.
    pub fn execute_all_pending_lazy_operations(&self) -> ClientResult<FlushReport> {
        let report = match self.executor.flush(&self.gateway) {
            Ok(report) => report,
            Err(e) => {
                self.stats.write().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        if !report.is_empty() {
            let mut stats = self.stats.write();
            stats.flushes += 1;
            stats.gateway_calls += u64::from(report.gateway_calls);
            stats.operations_executed += report.executed.len() as u64;
            stats.stale_retries += u64::from(report.stale_retries);
            stats.stale_results += report.stale_operations.len() as u64;
            stats.last_error = None;
        }

        self.run_callbacks(&report.executed);
        Ok(report)
    }

    fn run_callbacks(&self, executed: &[OperationId]) {
        for id in executed {
            let Some(callback) = self.callbacks.lock().remove(id) else {
                continue;
            };
            let value = self
                .executor
                .with_operation(*id, |op| op.result().cloned())
                .and_then(|result| result);
            match value {
                Ok(value) => callback(&value),
                Err(e) => {
                    tracing::debug!(operation = %id, error = %e, "skipping callback of failed operation")
                }
            }
        }
    }

    fn ensure_executed(&self, id: OperationId) -> ClientResult<()> {
        if self.executor.is_pending(id) {
            self.execute_all_pending_lazy_operations()?;
        }
        Ok(())
    }

    /// Returns true once the operation's value is available.
    pub fn is_value_created<T>(&self, lazy: &Lazy<T>) -> bool {
        self.executor
            .with_operation(lazy.id, |op| op.state().is_consumed())
            .unwrap_or(false)
    }

    /// Returns the value, flushing the session if it is still pending.
    pub fn value<T: DeserializeOwned>(&self, lazy: &Lazy<T>) -> ClientResult<T> {
        self.resolve(lazy).map(|materialized| materialized.value)
    }

    /// Returns the value and its staleness, flushing if needed.
    pub fn resolve<T: DeserializeOwned>(&self, lazy: &Lazy<T>) -> ClientResult<Materialized<T>> {
        self.ensure_executed(lazy.id)?;
        let (value, stale) = self.executor.with_operation(lazy.id, |op| {
            op.result()
                .map(|value| (value.clone(), op.state().is_stale()))
        })??;
        let value = serde_json::from_value(value).map_err(|e| {
            ClientError::deserialization(format!("{} as {}", lazy.id, std::any::type_name::<T>()), e)
        })?;
        Ok(Materialized { value, stale })
    }

    fn scope<T>(&self) -> ScopeBinding {
        ScopeBinding::new(
            Arc::clone(&self.context),
            short_type_name::<T>(),
            self.config().identity_property.clone(),
        )
    }

    fn register<T>(&self, build: impl FnOnce(OperationId) -> Box<dyn LazyOperation>) -> Lazy<T> {
        Lazy::new(self.executor.register(build))
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Registers lazy operations on a session.
pub struct LazySessionOperations<'a, G: TransportGateway> {
    session: &'a Session<G>,
}

impl<'a, G: TransportGateway> LazySessionOperations<'a, G> {
    /// Loads a document by key.
    ///
    /// A document the session already tracks is returned without a request.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Lazy<Option<T>> {
        let session = self.session;
        let scope = session.scope::<T>();
        let signal = session.config().stale_signal.clone();
        let key = key.to_string();

        if let Some(tracked) = session.tracker.get(&key) {
            tracing::trace!(key = %key, "load served from the session");
            let id = session.executor.register_materialized(move |id| {
                Box::new(LoadOperation::materialized(id, key, scope, tracked.document))
            });
            return Lazy::new(id);
        }
        session.register(move |id| Box::new(LoadOperation::new(id, key, scope, signal)))
    }

    /// Loads a document by key and calls `on_eval` once it is materialized.
    pub fn load_with<T, F>(&self, key: &str, on_eval: F) -> Lazy<Option<T>>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(Option<T>) + Send + 'static,
    {
        let lazy = self.load::<T>(key);
        self.on_evaluate(lazy, on_eval);
        lazy
    }

    /// Loads several documents and calls `on_eval` with them, in key order,
    /// once they are materialized.
    pub fn load_many_with<T, F>(&self, keys: &[&str], on_eval: F) -> Lazy<Vec<Option<T>>>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(Vec<Option<T>>) + Send + 'static,
    {
        let lazy = self.load_many::<T>(keys);
        self.on_evaluate(lazy, on_eval);
        lazy
    }

    /// Runs `on_eval` after the flush that materializes `lazy`, or right away
    /// when it already is.
    fn on_evaluate<T, F>(&self, lazy: Lazy<T>, on_eval: F)
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let callback: Callback = Box::new(move |value: &Value| {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(converted) => on_eval(converted),
                Err(e) => tracing::warn!(error = %e, "cannot convert value for callback"),
            }
        });

        if self.session.executor.is_pending(lazy.id) {
            self.session.callbacks.lock().insert(lazy.id, callback);
        } else if let Ok(Ok(value)) = self
            .session
            .executor
            .with_operation(lazy.id, |op| op.result().cloned())
        {
            callback(&value);
        }
    }

    /// Loads several documents by key; missing documents are `None`.
    pub fn load_many<T: DeserializeOwned>(&self, keys: &[&str]) -> Lazy<Vec<Option<T>>> {
        self.load_many_with_includes(keys, &[])
    }

    /// Loads several documents and the documents they reference through
    /// `includes`. Included documents end up in the session tracker.
    pub fn load_many_with_includes<T: DeserializeOwned>(
        &self,
        keys: &[&str],
        includes: &[&str],
    ) -> Lazy<Vec<Option<T>>> {
        let scope = self.session.scope::<T>();
        let signal = self.session.config().stale_signal.clone();
        let keys = keys.iter().map(|k| k.to_string()).collect();
        let includes = includes.iter().map(|p| p.to_string()).collect();
        self.session.register(move |id| {
            Box::new(MultiLoadOperation::new(id, keys, includes, scope, signal))
        })
    }

    /// Queries an index.
    pub fn query<T: DeserializeOwned>(&self, index: &str, query: IndexQuery) -> Lazy<Vec<T>> {
        let scope = self.session.scope::<T>();
        let signal = self.session.config().stale_signal.clone();
        let index = index.to_string();
        self.session.register(move |id| {
            Box::new(QueryOperation::new(id, index, query, scope, signal))
        })
    }

    /// Counts the matches of an index query.
    pub fn count(&self, index: &str, query: IndexQuery) -> Lazy<u64> {
        let signal = self.session.config().stale_signal.clone();
        let index = index.to_string();
        self.session
            .register(move |id| Box::new(CountOperation::new(id, index, query, signal)))
    }

    /// Loads documents whose key starts with a prefix.
    pub fn load_starting_with<T: DeserializeOwned>(&self, query: StartsWithQuery) -> Lazy<Vec<T>> {
        let scope = self.session.scope::<T>();
        let signal = self.session.config().stale_signal.clone();
        self.session.register(move |id| {
            Box::new(StartsWithOperation::new(id, query, scope, signal))
        })
    }

    /// Suggests terms similar to the query term.
    pub fn suggest(&self, index: &str, query: SuggestionQuery) -> Lazy<Vec<String>> {
        let signal = self.session.config().stale_signal.clone();
        let index = index.to_string();
        self.session
            .register(move |id| Box::new(SuggestOperation::new(id, index, query, signal)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use docket_protocol::{WireRequest, WireResponse};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct User {
        id: String,
        name: String,
    }

    fn doc(key: &str, name: &str) -> Value {
        json!({"name": name, "@metadata": {"@id": key, "@etag": 1}})
    }

    fn answer(request: &WireRequest) -> WireResponse {
        match request.param("id") {
            Some("users/missing") => WireResponse::not_found(),
            Some(key) => WireResponse::ok(doc(key, &key.to_uppercase())),
            None => WireResponse::error(400, "unsupported"),
        }
    }

    fn session() -> Session<Arc<MockTransport>> {
        let transport = Arc::new(MockTransport::new());
        transport.set_responder(|requests| Ok(requests.iter().map(answer).collect()));
        Session::new(
            transport,
            SessionConfig::new().with_stale_retry_delay(Duration::ZERO),
        )
    }

    #[test]
    fn value_flushes_pending_operations_once() {
        let session = session();
        let a = session.lazily().load::<User>("users/a");
        let b = session.lazily().load::<User>("users/b");
        assert!(!session.is_value_created(&a));

        let user = session.value(&a).unwrap().unwrap();
        assert_eq!(user.id, "users/a");
        assert!(session.is_value_created(&b));
        assert_eq!(session.gateway().call_count(), 1);

        // Reading again never goes to the server
        assert_eq!(b.value(&session).unwrap().unwrap().name, "USERS/B");
        assert_eq!(session.gateway().call_count(), 1);
        assert_eq!(session.stats().operations_executed, 2);
    }

    #[test]
    fn missing_document_is_none() {
        let session = session();
        let lazy = session.lazily().load::<User>("users/missing");
        assert_eq!(session.value(&lazy).unwrap(), None);
    }

    #[test]
    fn tracked_document_is_not_requested() {
        let session = session();
        let first = session.lazily().load::<User>("users/a");
        session.value(&first).unwrap();

        let second = session.lazily().load::<User>("users/A");
        assert!(session.is_value_created(&second));
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.value(&second).unwrap().unwrap().id, "users/a");
        assert_eq!(session.gateway().call_count(), 1);
    }

    #[test]
    fn callbacks_run_after_flush() {
        let session = session();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        session.lazily().load_with::<User, _>("users/a", move |user| {
            assert_eq!(user.unwrap().name, "USERS/A");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        session.execute_all_pending_lazy_operations().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Callbacks run once
        session.execute_all_pending_lazy_operations().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn conversion_failure_surfaces_on_read() {
        let session = session();
        let lazy = session.lazily().load::<u64>("users/a");
        let err = session.value(&lazy).unwrap_err();
        assert!(matches!(err, ClientError::Deserialization { .. }));
    }

    #[test]
    fn flush_failure_is_recorded() {
        let transport = Arc::new(MockTransport::new());
        transport.push_failure(ClientError::transport_retryable("down"));
        let session = Session::new(Arc::clone(&transport), SessionConfig::new());

        let lazy = session.lazily().load::<User>("users/a");
        assert!(session.value(&lazy).is_err());
        assert!(session.stats().last_error.unwrap().contains("down"));
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let session = session();
        let other = Session::new(Arc::new(MockTransport::new()), SessionConfig::new());
        let own = session.lazily().load::<User>("users/a");
        let lazy = other.lazily().load::<User>("users/a");
        assert_ne!(own.id(), lazy.id());
        assert!(matches!(
            session.value(&lazy),
            Err(ClientError::UnknownOperation(_))
        ));
    }

    #[test]
    fn short_type_names() {
        assert_eq!(short_type_name::<User>(), "User");
        assert_eq!(short_type_name::<Vec<User>>(), "Vec");
    }
}
