//! Transport gateway abstraction for multi-get round trips.

use crate::error::{ClientError, ClientResult};
use docket_protocol::{WireRequest, WireResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sends a batch of requests to the server in one round trip.
///
/// Implementations must return exactly one response per request, in request
/// order. A failure affects the whole batch.
pub trait TransportGateway: Send + Sync {
    /// Executes all `requests` in a single round trip.
    fn multi_get(&self, requests: &[WireRequest]) -> ClientResult<Vec<WireResponse>>;

    /// Checks if the gateway can reach the server.
    fn is_connected(&self) -> bool {
        true
    }

    /// Closes the gateway.
    fn close(&self) -> ClientResult<()> {
        Ok(())
    }
}

impl<G: TransportGateway + ?Sized> TransportGateway for Arc<G> {
    fn multi_get(&self, requests: &[WireRequest]) -> ClientResult<Vec<WireResponse>> {
        (**self).multi_get(requests)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&self) -> ClientResult<()> {
        (**self).close()
    }
}

type Responder = Box<dyn Fn(&[WireRequest]) -> ClientResult<Vec<WireResponse>> + Send + Sync>;

/// A scripted gateway for testing.
///
/// Each call pops the next scripted result. When the script is empty the
/// responder, if any, answers instead. Every batch is recorded.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    script: Mutex<VecDeque<ClientResult<Vec<WireResponse>>>>,
    responder: Mutex<Option<Responder>>,
    calls: Mutex<Vec<Vec<WireRequest>>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues the responses for the next unscripted call.
    pub fn push_responses(&self, responses: Vec<WireResponse>) {
        self.script.lock().push_back(Ok(responses));
    }

    /// Queues a failure for the next unscripted call.
    pub fn push_failure(&self, error: ClientError) {
        self.script.lock().push_back(Err(error));
    }

    /// Sets a fallback that answers once the script is exhausted.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[WireRequest]) -> ClientResult<Vec<WireResponse>> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Returns every batch received so far.
    pub fn calls(&self) -> Vec<Vec<WireRequest>> {
        self.calls.lock().clone()
    }

    /// Returns the number of round trips made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl TransportGateway for MockTransport {
    fn multi_get(&self, requests: &[WireRequest]) -> ClientResult<Vec<WireResponse>> {
        if !self.is_connected() {
            return Err(ClientError::transport_retryable("not connected"));
        }
        self.calls.lock().push(requests.to_vec());

        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        match self.responder.lock().as_ref() {
            Some(responder) => responder(requests),
            None => Err(ClientError::Protocol("No mock response set".into())),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> ClientResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());
        assert!(transport.multi_get(&[]).is_err());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn mock_transport_script_then_responder() {
        let transport = MockTransport::new();
        transport.push_responses(vec![WireResponse::ok(json!(1))]);
        transport.set_responder(|requests| {
            Ok(requests
                .iter()
                .map(|_| WireResponse::not_found())
                .collect())
        });

        let request = WireRequest::new("/docs").with_param("id", "users/1");
        let first = transport.multi_get(&[request.clone()]).unwrap();
        assert_eq!(first[0].result(), &json!(1));

        let second = transport
            .multi_get(&[request.clone(), request])
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(second[1].is_not_found());
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls()[1].len(), 2);
    }

    #[test]
    fn mock_transport_without_script() {
        let transport = MockTransport::new();
        let err = transport.multi_get(&[]).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn arc_gateway() {
        let transport = Arc::new(MockTransport::new());
        transport.push_failure(ClientError::transport_retryable("reset"));
        let shared: Arc<MockTransport> = Arc::clone(&transport);
        assert!(shared.multi_get(&[]).is_err());
        assert_eq!(transport.call_count(), 1);
    }
}
