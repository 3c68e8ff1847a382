//! Integration tests for the client against the reference server.

use docket_client::{
    ClientError, HttpReply, HttpTransport, IndexQuery, LoopbackClient, LoopbackServer,
    Session, SessionConfig, StaleSignal, StartsWithQuery, SuggestionQuery, TransportConfig,
};
use docket_server::{DocumentServer, ServerConfig};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Routes loopback posts to an in-memory server.
struct ServerEndpoint {
    server: Arc<DocumentServer>,
}

impl LoopbackServer for ServerEndpoint {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<HttpReply, String> {
        self.server
            .handle_post(path, body)
            .map(|(status, body)| HttpReply { status, body })
    }
}

type Gateway = HttpTransport<LoopbackClient<ServerEndpoint>>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct User {
    id: String,
    name: String,
    #[serde(default)]
    role: String,
    #[serde(rename = "companyId", default)]
    company_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Company {
    id: String,
    name: String,
}

fn seeded_server(config: ServerConfig) -> Arc<DocumentServer> {
    let server = Arc::new(DocumentServer::new(config));
    server.create_index("users/by_role", "users").unwrap();
    server
        .put("users/1", json!({"name": "Alice", "role": "admin", "companyId": "companies/1"}))
        .unwrap();
    server
        .put("users/2", json!({"name": "Bob", "role": "user", "companyId": "companies/1"}))
        .unwrap();
    server
        .put("users/3", json!({"name": "Carol", "role": "admin"}))
        .unwrap();
    server.put("companies/1", json!({"name": "Acme"})).unwrap();
    server
}

fn connect(server: &Arc<DocumentServer>, config: SessionConfig) -> Session<Gateway> {
    let transport = HttpTransport::new(
        TransportConfig::new("http://localhost:8080").with_database(server.config().database.clone()),
        LoopbackClient::new(ServerEndpoint {
            server: Arc::clone(server),
        }),
    );
    Session::new(transport, config)
}

fn fast_config() -> SessionConfig {
    SessionConfig::new().with_stale_retry_delay(Duration::ZERO)
}

#[test]
fn three_loads_one_round_trip() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config());

    let a = session.lazily().load::<User>("users/1");
    let b = session.lazily().load::<User>("users/2");
    let c = session.lazily().load::<User>("users/3");
    assert_eq!(server.batches_served(), 0);

    assert_eq!(session.value(&a).unwrap().unwrap().name, "Alice");
    assert_eq!(session.value(&b).unwrap().unwrap().name, "Bob");
    assert_eq!(session.value(&c).unwrap().unwrap().name, "Carol");

    assert_eq!(server.batches_served(), 1);
    assert_eq!(session.number_of_requests(), 1);
    let stats = session.stats();
    assert_eq!(stats.stale_retries, 0);
    assert_eq!(stats.operations_executed, 3);
}

#[test]
fn stale_queries_are_retried_until_fresh() {
    // Each stale read counts; the index catches up after the second one
    let server = seeded_server(ServerConfig::default().with_stale_reads_before_catch_up(2));
    let session = connect(&server, fast_config());

    let admins = session.lazily().query::<User>(
        "users/by_role",
        IndexQuery::new("role:admin").wait_for_non_stale_results(),
    );
    let everyone = session
        .lazily()
        .query::<User>("users/by_role", IndexQuery::new("").wait_for_non_stale_results());

    let report = session.execute_all_pending_lazy_operations().unwrap();
    assert_eq!(report.gateway_calls, 2);
    assert_eq!(report.stale_retries, 1);
    assert!(report.stale_operations.is_empty());
    assert_eq!(server.batches_served(), 2);

    let admins = session.resolve(&admins).unwrap();
    assert!(!admins.stale);
    assert_eq!(admins.value.len(), 2);
    assert_eq!(session.value(&everyone).unwrap().len(), 3);

    // A later flush starts from a fresh retry budget
    let again = session.lazily().query::<User>(
        "users/by_role",
        IndexQuery::new("role:user").wait_for_non_stale_results(),
    );
    assert_eq!(session.value(&again).unwrap()[0].name, "Bob");
    assert_eq!(server.batches_served(), 3);
}

#[test]
fn stale_tolerant_query_is_not_retried() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config());

    let users = session
        .lazily()
        .query::<User>("users/by_role", IndexQuery::new(""));
    let users = session.resolve(&users).unwrap();

    assert!(users.stale);
    assert!(users.value.is_empty());
    assert_eq!(server.batches_served(), 1);
}

#[test]
fn retry_ceiling_returns_last_stale_result() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config().with_max_stale_retries(2));

    let users = session
        .lazily()
        .query::<User>("users/by_role", IndexQuery::new("").wait_for_non_stale_results());
    let report = session.execute_all_pending_lazy_operations().unwrap();

    assert_eq!(report.gateway_calls, 3);
    assert_eq!(report.stale_operations, vec![users.id()]);
    let users = session.resolve(&users).unwrap();
    assert!(users.stale);
    assert_eq!(session.stats().stale_results, 1);
}

#[test]
fn header_signal_detects_stale_index() {
    let server = seeded_server(ServerConfig::default().with_stale_reads_before_catch_up(1));
    let session = connect(
        &server,
        fast_config().with_stale_signal(StaleSignal::header()),
    );

    let users = session
        .lazily()
        .query::<User>("users/by_role", IndexQuery::new("").wait_for_non_stale_results());
    assert_eq!(session.value(&users).unwrap().len(), 3);
    assert_eq!(server.batches_served(), 2);
}

#[test]
fn failing_request_does_not_affect_siblings() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config());

    let missing_index = session
        .lazily()
        .query::<User>("users/by_name", IndexQuery::new(""));
    let alice = session.lazily().load::<User>("users/1");
    let nobody = session.lazily().load::<User>("users/404");

    let report = session.execute_all_pending_lazy_operations().unwrap();
    assert_eq!(report.failed_operations, vec![missing_index.id()]);

    assert!(matches!(
        session.value(&missing_index),
        Err(ClientError::Server { status: 404, .. })
    ));
    assert_eq!(session.value(&alice).unwrap().unwrap().id, "users/1");
    assert_eq!(session.value(&nobody).unwrap(), None);
}

#[test]
fn includes_are_tracked_and_served_locally() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config());

    let users = session
        .lazily()
        .load_many_with_includes::<User>(&["users/1", "users/9", "users/2"], &["companyId"]);
    let users = session.value(&users).unwrap();
    assert_eq!(users.len(), 3);
    assert!(users[1].is_none());
    assert_eq!(
        users[0].as_ref().unwrap().company_id.as_deref(),
        Some("companies/1")
    );
    assert!(session.tracker().is_loaded("companies/1"));
    assert_eq!(session.tracker().get("users/1").unwrap().entity_type, "User");
    assert_eq!(
        session.tracker().get("companies/1").unwrap().entity_type,
        "companies"
    );

    let company = session.lazily().load::<Company>("companies/1");
    assert!(session.is_value_created(&company));
    assert_eq!(session.value(&company).unwrap().unwrap().name, "Acme");
    assert_eq!(server.batches_served(), 1);
}

#[test]
fn count_prefix_and_suggestions_share_a_batch() {
    let server = seeded_server(ServerConfig::default());
    server.catch_up_indexes();
    let session = connect(&server, fast_config());

    let admins = session
        .lazily()
        .count("users/by_role", IndexQuery::new("role:admin"));
    let users = session
        .lazily()
        .load_starting_with::<User>(StartsWithQuery::new("users/").with_exclude("3"));
    let names = session
        .lazily()
        .suggest("users/by_role", SuggestionQuery::new("alise", "name"));

    assert_eq!(session.value(&admins).unwrap(), 2);
    let users = session.value(&users).unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].role, "admin");
    assert_eq!(session.value(&names).unwrap(), vec!["alice".to_string()]);
    assert_eq!(server.batches_served(), 1);
}

#[test]
fn unknown_database_fails_the_whole_flush() {
    let server = seeded_server(ServerConfig::default());
    let transport = HttpTransport::new(
        TransportConfig::new("http://localhost:8080").with_database("elsewhere"),
        LoopbackClient::new(ServerEndpoint {
            server: Arc::clone(&server),
        }),
    );
    let session = Session::new(transport, fast_config());

    let alice = session.lazily().load::<User>("users/1");
    let err = session.value(&alice).unwrap_err();
    assert!(matches!(err, ClientError::Transport { retryable: false, .. }));
    assert_eq!(session.pending_count(), 1);
    assert!(!session.is_value_created(&alice));
    assert!(session.gateway().last_error().is_some());
}

#[test]
fn callback_registrations_join_the_next_flush() {
    let server = seeded_server(ServerConfig::default());
    let session = Arc::new(connect(&server, fast_config()));
    let follow_up = Arc::new(Mutex::new(None));

    let registered = Arc::clone(&follow_up);
    let inner = Arc::clone(&session);
    session
        .lazily()
        .load_with::<User, _>("users/1", move |user| {
            let company = user.and_then(|u| u.company_id).unwrap_or_default();
            *registered.lock() = Some(inner.lazily().load::<Company>(&company));
        });

    session.execute_all_pending_lazy_operations().unwrap();
    assert_eq!(server.batches_served(), 1);
    assert_eq!(session.pending_count(), 1);

    let company = follow_up.lock().take().unwrap();
    assert_eq!(session.value(&company).unwrap().unwrap().name, "Acme");
    assert_eq!(server.batches_served(), 2);
}

#[test]
fn request_budget_counts_flushes_not_retry_rounds() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config().with_max_requests(2));

    let users = session
        .lazily()
        .query::<User>("users/by_role", IndexQuery::new("").wait_for_non_stale_results());
    let alice = session.lazily().load::<User>("users/1");

    let users = session.resolve(&users).unwrap();
    assert!(users.stale);
    assert_eq!(server.batches_served(), 4);
    assert_eq!(session.number_of_requests(), 1);
    assert_eq!(session.value(&alice).unwrap().unwrap().name, "Alice");

    let bob = session.lazily().load::<User>("users/2");
    assert_eq!(session.value(&bob).unwrap().unwrap().name, "Bob");
    assert_eq!(session.number_of_requests(), 2);

    let carol = session.lazily().load::<User>("users/3");
    let err = session.value(&carol).unwrap_err();
    assert_eq!(err, ClientError::MaxRequestsExceeded { max: 2 });
    assert_eq!(server.batches_served(), 5);
    assert_eq!(session.pending_count(), 1);
    assert!(session.stats().last_error.is_some());
}

#[test]
fn multi_load_callback_receives_documents_in_key_order() {
    let server = seeded_server(ServerConfig::default());
    let session = connect(&server, fast_config());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let names = Arc::clone(&seen);
    let users = session
        .lazily()
        .load_many_with::<User, _>(&["users/2", "users/9", "users/1"], move |users| {
            *names.lock() = users
                .into_iter()
                .map(|user| user.map(|u| u.name))
                .collect();
        });
    assert!(seen.lock().is_empty());

    session.execute_all_pending_lazy_operations().unwrap();
    assert_eq!(
        *seen.lock(),
        vec![Some("Bob".to_string()), None, Some("Alice".to_string())]
    );
    assert_eq!(session.value(&users).unwrap().len(), 3);
    assert_eq!(server.batches_served(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn responses_pair_by_position(present in proptest::collection::vec(any::<bool>(), 1..24)) {
        let server = Arc::new(DocumentServer::new(ServerConfig::default()));
        for (i, exists) in present.iter().enumerate() {
            if *exists {
                server.put(&format!("items/{}", i), json!({"name": format!("item {}", i)})).unwrap();
            }
        }
        let session = connect(&server, fast_config());

        let handles: Vec<_> = (0..present.len())
            .map(|i| session.lazily().load::<User>(&format!("items/{}", i)))
            .collect();
        session.execute_all_pending_lazy_operations().unwrap();
        prop_assert_eq!(server.batches_served(), 1);

        for (i, handle) in handles.iter().enumerate() {
            let value = session.value(handle).unwrap();
            if present[i] {
                let user = value.unwrap();
                prop_assert_eq!(user.id, format!("items/{}", i));
                prop_assert_eq!(user.name, format!("item {}", i));
            } else {
                prop_assert!(value.is_none());
            }
        }
    }
}
