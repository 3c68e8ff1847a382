//! Batch execution of lazy operations.
//!
//! A flush takes a snapshot of the pending queue, sends one multi-get for the
//! whole snapshot, pairs each response with the operation at the same
//! position and re-requests only the operations that got a stale result but
//! refuse stale reads. Operations registered while a flush runs stay queued
//! for the next one.

use crate::config::SessionConfig;
use crate::error::{ClientError, ClientResult};
use crate::operation::{LazyOperation, OperationId, Outcome};
use crate::transport::TransportGateway;
use docket_protocol::WireRequest;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Server-side duration of one request of a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTimeItem {
    /// Request path and query.
    pub url: String,
    /// Time the server reported for it.
    pub duration: Duration,
}

/// Result of a flush.
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Number of multi-get round trips made.
    pub gateway_calls: u32,
    /// Number of stale-triggered re-requests.
    pub stale_retries: u32,
    /// Operations executed, in batch order.
    pub executed: Vec<OperationId>,
    /// Operations whose final result is stale.
    pub stale_operations: Vec<OperationId>,
    /// Operations whose response could not be consumed.
    pub failed_operations: Vec<OperationId>,
    /// Per-request server durations, when the server reported them.
    pub duration_breakdown: Vec<ResponseTimeItem>,
    /// Sum of the reported server durations.
    pub total_server_duration: Duration,
    /// Wall-clock duration of the flush.
    pub total_client_duration: Duration,
}

impl FlushReport {
    /// Returns true if nothing was sent.
    pub fn is_empty(&self) -> bool {
        self.gateway_calls == 0
    }

    /// Number of operations executed.
    pub fn operations(&self) -> usize {
        self.executed.len()
    }
}

/// Ids are unique across sessions so a foreign handle never aliases.
static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Registry {
    operations: HashMap<OperationId, Box<dyn LazyOperation>>,
    pending: Vec<OperationId>,
    in_flight: HashSet<OperationId>,
}

/// Owns the operations of a session and flushes them in batches.
pub struct BatchExecutor {
    config: SessionConfig,
    registry: Mutex<Registry>,
    current_retry: AtomicU32,
    requests_made: AtomicU32,
}

impl BatchExecutor {
    /// Creates an executor.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            current_retry: AtomicU32::new(0),
            requests_made: AtomicU32::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn allocate_id(&self) -> OperationId {
        OperationId::new(NEXT_OPERATION_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Registers an operation and queues it for the next flush.
    pub fn register<F>(&self, build: F) -> OperationId
    where
        F: FnOnce(OperationId) -> Box<dyn LazyOperation>,
    {
        let id = self.allocate_id();
        let operation = build(id);
        let mut registry = self.registry.lock();
        registry.operations.insert(id, operation);
        registry.pending.push(id);
        trace!(operation = %id, "registered lazy operation");
        id
    }

    /// Registers an operation whose result is already materialized.
    pub fn register_materialized<F>(&self, build: F) -> OperationId
    where
        F: FnOnce(OperationId) -> Box<dyn LazyOperation>,
    {
        let id = self.allocate_id();
        let operation = build(id);
        self.registry.lock().operations.insert(id, operation);
        id
    }

    /// Returns true if `id` waits for a flush.
    pub fn is_pending(&self, id: OperationId) -> bool {
        self.registry.lock().pending.contains(&id)
    }

    /// Number of queued operations.
    pub fn pending_count(&self) -> usize {
        self.registry.lock().pending.len()
    }

    /// Runs `f` on a registered operation.
    ///
    /// Fails with `ResultNotReady` while the operation is being flushed.
    pub fn with_operation<R>(
        &self,
        id: OperationId,
        f: impl FnOnce(&dyn LazyOperation) -> R,
    ) -> ClientResult<R> {
        let registry = self.registry.lock();
        match registry.operations.get(&id) {
            Some(operation) => Ok(f(operation.as_ref())),
            None if registry.in_flight.contains(&id) => Err(ClientError::ResultNotReady),
            None => Err(ClientError::UnknownOperation(id)),
        }
    }

    /// Number of session requests made so far.
    ///
    /// A flush is one request however many stale-retry rounds it takes.
    pub fn requests_made(&self) -> u32 {
        self.requests_made.load(Ordering::SeqCst)
    }

    /// Stale retry round last reached by a running flush; zero between
    /// flushes.
    pub fn current_retry(&self) -> u32 {
        self.current_retry.load(Ordering::SeqCst)
    }

    /// Executes every pending operation.
    ///
    /// A gateway failure fails the whole flush: the batch is returned
    /// unmaterialized and the queue is left as it was.
    pub fn flush<G: TransportGateway + ?Sized>(&self, gateway: &G) -> ClientResult<FlushReport> {
        let start = Instant::now();

        let mut batch = self.check_out();
        if batch.is_empty() {
            debug!("no pending lazy operations");
            return Ok(FlushReport::default());
        }
        let snapshot: HashSet<OperationId> = batch.iter().map(|op| op.id()).collect();

        let mut report = FlushReport::default();
        let outcome = self.execute(gateway, &mut batch, &mut report);
        if outcome.is_err() {
            for operation in batch.iter_mut() {
                operation.state_mut().reset();
            }
        } else {
            self.summarize(&batch, &mut report);
        }

        let mut registry = self.registry.lock();
        for operation in batch {
            let id = operation.id();
            registry.in_flight.remove(&id);
            registry.operations.insert(id, operation);
        }
        self.current_retry.store(0, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                registry.pending.retain(|id| !snapshot.contains(id));
                report.total_client_duration = start.elapsed();
                debug!(
                    operations = report.operations(),
                    gateway_calls = report.gateway_calls,
                    stale_retries = report.stale_retries,
                    "flushed lazy operations"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, operations = snapshot.len(), "flush failed, operations stay queued");
                Err(e)
            }
        }
    }

    /// Takes the queued operations that are not already in flight.
    fn check_out(&self) -> Vec<Box<dyn LazyOperation>> {
        let mut guard = self.registry.lock();
        let registry = &mut *guard;
        let mut batch = Vec::new();
        for id in registry.pending.iter() {
            if registry.in_flight.contains(id) {
                continue;
            }
            if let Some(operation) = registry.operations.remove(id) {
                registry.in_flight.insert(*id);
                batch.push(operation);
            }
        }
        batch
    }

    fn reserve_request(&self) -> ClientResult<()> {
        let max = self.config.max_requests_per_session;
        self.requests_made
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |made| {
                (made < max).then_some(made + 1)
            })
            .map(|_| ())
            .map_err(|_| ClientError::MaxRequestsExceeded { max })
    }

    fn execute<G: TransportGateway + ?Sized>(
        &self,
        gateway: &G,
        batch: &mut [Box<dyn LazyOperation>],
        report: &mut FlushReport,
    ) -> ClientResult<()> {
        self.reserve_request()?;
        let mut active: Vec<usize> = (0..batch.len()).collect();
        let mut round = 0;

        loop {
            let requests: Vec<WireRequest> =
                active.iter().map(|&i| batch[i].create_request()).collect();
            report.gateway_calls += 1;
            debug!(
                attempt = round,
                requests = requests.len(),
                "sending multi-get batch"
            );

            let responses = gateway.multi_get(&requests)?;
            if responses.len() != requests.len() {
                return Err(ClientError::transport_fatal(format!(
                    "expected {} responses, got {}",
                    requests.len(),
                    responses.len()
                )));
            }

            for (&i, (request, response)) in active.iter().zip(requests.iter().zip(&responses)) {
                let operation = &mut batch[i];
                operation.state_mut().record_attempt();
                if let Some(duration) = response.request_time() {
                    report.duration_breakdown.push(ResponseTimeItem {
                        url: request.url_and_query(),
                        duration,
                    });
                    report.total_server_duration += duration;
                }

                let handled = {
                    let _scope = operation.enter_context();
                    operation.handle_response(response)
                };
                if let Err(err) = handled {
                    debug!(operation = %operation.id(), error = %err, "cannot consume response");
                    operation.state_mut().fail(err);
                }
            }

            let retry: Vec<usize> = active
                .iter()
                .copied()
                .filter(|&i| batch[i].requires_retry())
                .collect();
            if retry.is_empty() {
                return Ok(());
            }

            if round >= self.config.max_stale_retries {
                for &i in &retry {
                    warn!(
                        operation = %batch[i].id(),
                        label = batch[i].state().label(),
                        retries = round,
                        "result is still stale after the retry limit"
                    );
                }
                return Ok(());
            }

            round += 1;
            self.current_retry.store(round, Ordering::SeqCst);
            report.stale_retries += 1;
            debug!(operations = retry.len(), round, "re-requesting stale results");
            if !self.config.stale_retry_delay.is_zero() {
                std::thread::sleep(self.config.stale_retry_delay);
            }
            active = retry;
        }
    }

    fn summarize(&self, batch: &[Box<dyn LazyOperation>], report: &mut FlushReport) {
        for operation in batch {
            let state = operation.state();
            report.executed.push(state.id());
            if matches!(state.outcome(), Outcome::Failed(_)) {
                report.failed_operations.push(state.id());
            }
            if state.is_stale() {
                report.stale_operations.push(state.id());
            }
        }
    }
}
