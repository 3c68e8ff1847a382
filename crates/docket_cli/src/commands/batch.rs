//! Batch command implementation.

use docket_client::{
    HttpReply, HttpTransport, IndexQuery, Lazy, LoopbackClient, LoopbackServer, Session,
    SessionConfig, TransportConfig,
};
use docket_server::{DocumentServer, ServerConfig};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Options of the batch command.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Seed file mapping keys to documents.
    pub seed: PathBuf,
    /// Indexes as `name=collection`.
    pub indexes: Vec<String>,
    /// Keys to load.
    pub loads: Vec<String>,
    /// Queries as `index:query`.
    pub queries: Vec<String>,
    /// Whether queries wait for non-stale results.
    pub wait_non_stale: bool,
    /// Stale reads an index serves before catching up.
    pub stale_reads: u32,
    /// Maximum stale retry rounds.
    pub max_retries: u32,
}

/// Batch execution result.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    /// Number of seeded documents.
    pub documents_seeded: usize,
    /// Round trips to the server.
    pub gateway_calls: u32,
    /// Stale retry rounds.
    pub stale_retries: u32,
    /// Server time reported by the responses, in microseconds.
    pub server_time_us: u128,
    /// Load results, in request order.
    pub loads: Vec<LoadOutcome>,
    /// Query results, in request order.
    pub queries: Vec<QueryOutcome>,
}

/// Result of one load.
#[derive(Debug, Serialize)]
pub struct LoadOutcome {
    /// Document key.
    pub key: String,
    /// The document, if found.
    pub document: Option<Value>,
    /// Error, if the load failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one query.
#[derive(Debug, Serialize)]
pub struct QueryOutcome {
    /// Index name.
    pub index: String,
    /// Query text.
    pub query: String,
    /// Whether the final result was stale.
    pub stale: bool,
    /// Matching documents.
    pub results: Vec<Value>,
    /// Error, if the query failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

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

/// Runs the batch command.
pub fn run(options: &BatchOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = execute(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Seeds a server and flushes the requested operations in one batch.
pub fn execute(options: &BatchOptions) -> Result<BatchResult, Box<dyn std::error::Error>> {
    let seed = std::fs::read_to_string(&options.seed)
        .map_err(|e| format!("Cannot read seed file {:?}: {}", options.seed, e))?;
    let documents: Map<String, Value> = serde_json::from_str(&seed)?;

    let server = Arc::new(DocumentServer::new(
        ServerConfig::default().with_stale_reads_before_catch_up(options.stale_reads),
    ));
    // Indexes exist before the seed, so they start out behind it
    for spec in &options.indexes {
        let (name, collection) = parse_index(spec)?;
        server.create_index(name, collection)?;
    }
    let documents_seeded = documents.len();
    for (key, document) in documents {
        server.put(&key, document)?;
    }

    let transport = HttpTransport::new(
        TransportConfig::new("http://localhost").with_database(server.config().database.clone()),
        LoopbackClient::new(ServerEndpoint {
            server: Arc::clone(&server),
        }),
    );
    let session = Session::new(
        transport,
        SessionConfig::new().with_max_stale_retries(options.max_retries),
    );

    let loads: Vec<(String, Lazy<Option<Value>>)> = options
        .loads
        .iter()
        .map(|key| (key.clone(), session.lazily().load::<Value>(key)))
        .collect();
    let mut queries: Vec<(String, String, Lazy<Vec<Value>>)> = Vec::new();
    for spec in &options.queries {
        let (index, text) = parse_query(spec)?;
        let mut query = IndexQuery::new(text);
        if options.wait_non_stale {
            query = query.wait_for_non_stale_results();
        }
        let lazy = session.lazily().query::<Value>(index, query);
        queries.push((index.to_string(), text.to_string(), lazy));
    }

    let report = session.execute_all_pending_lazy_operations()?;
    tracing::info!(
        gateway_calls = report.gateway_calls,
        stale_retries = report.stale_retries,
        "batch executed"
    );

    let loads = loads
        .into_iter()
        .map(|(key, lazy)| match session.value(&lazy) {
            Ok(document) => LoadOutcome {
                key,
                document,
                error: None,
            },
            Err(e) => LoadOutcome {
                key,
                document: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    let queries = queries
        .into_iter()
        .map(|(index, query, lazy)| match session.resolve(&lazy) {
            Ok(materialized) => QueryOutcome {
                index,
                query,
                stale: materialized.stale,
                results: materialized.value,
                error: None,
            },
            Err(e) => QueryOutcome {
                index,
                query,
                stale: false,
                results: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(BatchResult {
        documents_seeded,
        gateway_calls: report.gateway_calls,
        stale_retries: report.stale_retries,
        server_time_us: report.total_server_duration.as_micros(),
        loads,
        queries,
    })
}

fn parse_index(spec: &str) -> Result<(&str, &str), String> {
    match spec.split_once('=') {
        Some((name, collection)) if !name.is_empty() && !collection.is_empty() => {
            Ok((name, collection))
        }
        _ => Err(format!("Invalid index '{}', expected name=collection", spec)),
    }
}

fn parse_query(spec: &str) -> Result<(&str, &str), String> {
    match spec.split_once(':') {
        Some((index, query)) if !index.is_empty() => Ok((index, query)),
        _ => Err(format!("Invalid query '{}', expected index:query", spec)),
    }
}

fn print_text_output(result: &BatchResult) {
    println!("Docket Lazy Batch");
    println!("=================");
    println!();
    println!("Documents seeded: {}", result.documents_seeded);
    println!("Gateway calls:    {}", result.gateway_calls);
    println!("Stale retries:    {}", result.stale_retries);
    println!("Server time:      {} us", result.server_time_us);

    if !result.loads.is_empty() {
        println!();
        println!("Loads:");
        for load in &result.loads {
            match (&load.document, &load.error) {
                (_, Some(error)) => println!("  {}: error: {}", load.key, error),
                (Some(document), None) => println!("  {}: {}", load.key, document),
                (None, None) => println!("  {}: not found", load.key),
            }
        }
    }

    if !result.queries.is_empty() {
        println!();
        println!("Queries:");
        for query in &result.queries {
            if let Some(error) = &query.error {
                println!("  {} \"{}\": error: {}", query.index, query.query, error);
                continue;
            }
            println!(
                "  {} \"{}\": {} result(s){}",
                query.index,
                query.query,
                query.results.len(),
                if query.stale { " (stale)" } else { "" }
            );
            for document in &query.results {
                println!("    {}", document);
            }
        }
    }
}
