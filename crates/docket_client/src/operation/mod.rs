//! Lazy operations.
//!
//! A lazy operation describes one read whose execution is deferred until the
//! session flushes. Every variant composes an [`OperationState`] and
//! implements [`LazyOperation`]; the executor drives them through the
//! request/response cycle without knowing which variant it holds.

mod load;
mod query;
mod suggest;

pub use load::{LoadOperation, MultiLoadOperation, StartsWithOperation};
pub use query::{CountOperation, QueryOperation};
pub use suggest::SuggestOperation;

use crate::config::StaleSignal;
use crate::context::ContextGuard;
use crate::error::{ClientError, ClientResult};
use docket_protocol::{QueryResult, WireRequest, WireResponse};
use serde_json::Value;
use std::fmt;

/// Identifies a lazy operation within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Creates an id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Whether an operation accepts results computed against a stale index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Stale results are accepted as they are.
    #[default]
    AllowStale,
    /// Stale results trigger a re-request, up to the retry ceiling.
    WaitForNonStale,
}

/// Materialization outcome of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No response has been consumed.
    NotReady,
    /// The last consumed response produced this result.
    Ready(Value),
    /// Consuming the last response failed.
    Failed(ClientError),
}

/// State shared by every operation variant.
#[derive(Debug, Clone)]
pub struct OperationState {
    id: OperationId,
    label: String,
    consistency: Consistency,
    stale_signal: StaleSignal,
    outcome: Outcome,
    query_result: Option<QueryResult>,
    stale: bool,
    attempts: u32,
}

impl OperationState {
    /// Creates the state of an operation that has not run yet.
    pub fn new(
        id: OperationId,
        label: impl Into<String>,
        consistency: Consistency,
        stale_signal: StaleSignal,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            consistency,
            stale_signal,
            outcome: Outcome::NotReady,
            query_result: None,
            stale: false,
            attempts: 0,
        }
    }

    /// Operation id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Human-readable description used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Consistency preference.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Staleness signal in effect.
    pub fn stale_signal(&self) -> &StaleSignal {
        &self.stale_signal
    }

    /// Current outcome.
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Whether the last consumed response was stale.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of responses consumed.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true once a response has been consumed.
    pub fn is_consumed(&self) -> bool {
        !matches!(self.outcome, Outcome::NotReady)
    }

    /// Records a consumed response.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Stores a result.
    pub fn succeed(&mut self, value: Value, stale: bool) {
        self.outcome = Outcome::Ready(value);
        self.stale = stale;
    }

    /// Stores a result together with its query result.
    pub fn succeed_query(&mut self, value: Value, query_result: QueryResult, stale: bool) {
        self.query_result = Some(query_result);
        self.succeed(value, stale);
    }

    /// Stores a failure; a failed operation is never retried.
    pub fn fail(&mut self, error: ClientError) {
        self.outcome = Outcome::Failed(error);
        self.query_result = None;
        self.stale = false;
    }

    /// Forgets everything consumed so far.
    pub fn reset(&mut self) {
        self.outcome = Outcome::NotReady;
        self.query_result = None;
        self.stale = false;
        self.attempts = 0;
    }

    /// True when the last result was stale and stale reads are refused.
    pub fn requires_retry(&self) -> bool {
        self.stale
            && self.consistency == Consistency::WaitForNonStale
            && matches!(self.outcome, Outcome::Ready(_))
    }

    /// Materialized result.
    pub fn result(&self) -> ClientResult<&Value> {
        match &self.outcome {
            Outcome::NotReady => Err(ClientError::ResultNotReady),
            Outcome::Ready(value) => Ok(value),
            Outcome::Failed(err) => Err(err.clone()),
        }
    }

    /// Structured query result, for variants that have one.
    pub fn query_result(&self) -> ClientResult<Option<&QueryResult>> {
        match &self.outcome {
            Outcome::NotReady => Err(ClientError::ResultNotReady),
            Outcome::Ready(_) => Ok(self.query_result.as_ref()),
            Outcome::Failed(err) => Err(err.clone()),
        }
    }

    /// Applies the staleness signal to a response.
    pub fn detect_stale(&self, response: &WireResponse, query_result: Option<&QueryResult>) -> bool {
        self.stale_signal.is_stale(response, query_result)
    }

    /// Builds a deserialization error for this operation.
    pub fn deserialization_error(&self, message: impl ToString) -> ClientError {
        ClientError::deserialization(self.label.clone(), message)
    }
}

/// A read registered now and executed on the next flush.
///
/// `create_request` must be deterministic for a given state: the executor
/// calls it again for every retry round. `handle_response` returns `Err` when
/// the response cannot be consumed; the executor records that error as the
/// operation's outcome without touching its siblings.
pub trait LazyOperation: Send {
    /// Shared state.
    fn state(&self) -> &OperationState;

    /// Shared state, mutably.
    fn state_mut(&mut self) -> &mut OperationState;

    /// Builds the request for the next attempt.
    fn create_request(&self) -> WireRequest;

    /// Consumes the response paired with the last request.
    fn handle_response(&mut self, response: &WireResponse) -> ClientResult<()>;

    /// Enters this operation's conversion scope.
    fn enter_context(&self) -> Option<ContextGuard> {
        None
    }

    /// Operation id.
    fn id(&self) -> OperationId {
        self.state().id()
    }

    /// Whether the last response must be re-requested.
    fn requires_retry(&self) -> bool {
        self.state().requires_retry()
    }

    /// Materialized result.
    fn result(&self) -> ClientResult<&Value> {
        self.state().result()
    }

    /// Structured query result.
    fn query_result(&self) -> ClientResult<Option<&QueryResult>> {
        self.state().query_result()
    }
}

/// Maps an error status on one response to a per-operation error.
pub(crate) fn check_status(response: &WireResponse, allow_not_found: bool) -> ClientResult<()> {
    if response.request_has_errors() || (response.is_not_found() && !allow_not_found) {
        return Err(ClientError::Server {
            status: response.status(),
            message: response.error_message(),
        });
    }
    Ok(())
}
