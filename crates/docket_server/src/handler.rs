//! Request handlers for the routes a multi-get may contain.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::index::{field_value, IndexRegistry};
use crate::store::DocumentStore;
use docket_protocol::{
    MultiLoadResult, QueryResult, StringDistance, SuggestionQueryResult, WireRequest,
    WireResponse, INDEX_STALE_HEADER, REQUEST_TIME_HEADER,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Context shared by all handlers.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Document storage.
    pub store: Arc<DocumentStore>,
    /// Indexes.
    pub indexes: Arc<IndexRegistry>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<DocumentStore>, indexes: Arc<IndexRegistry>) -> Self {
        Self {
            config,
            store,
            indexes,
        }
    }
}

/// Answers the individual requests of a multi-get.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Answers one request; failures become an error response.
    pub fn handle(&self, request: &WireRequest) -> WireResponse {
        let start = Instant::now();
        let response = self.route(request).unwrap_or_else(|e| {
            tracing::debug!(url = %request.url(), error = %e, "request failed");
            WireResponse::error(e.status_code(), e.to_string())
        });

        if self.context.config.report_request_time {
            let elapsed = start.elapsed().as_millis().to_string();
            response.with_header(REQUEST_TIME_HEADER, elapsed)
        } else {
            response
        }
    }

    fn route(&self, request: &WireRequest) -> ServerResult<WireResponse> {
        let path = request.url().trim_end_matches('/');
        match path {
            "/docs" => self.handle_docs(request),
            "/queries" => self.handle_multi_load(request),
            _ => {
                if let Some(index) = path.strip_prefix("/indexes/") {
                    self.handle_query(index, request)
                } else if let Some(index) = path.strip_prefix("/suggest/") {
                    self.handle_suggest(index, request)
                } else {
                    Err(ServerError::UnknownRoute(request.url().to_string()))
                }
            }
        }
    }

    /// `GET /docs?id=` or `GET /docs?startsWith=`.
    pub fn handle_docs(&self, request: &WireRequest) -> ServerResult<WireResponse> {
        let store = &self.context.store;
        if let Some(key) = request.param("id") {
            return Ok(match store.get(key) {
                Some(document) => WireResponse::ok(document),
                None => WireResponse::not_found(),
            });
        }

        let prefix = request.param("startsWith").ok_or_else(|| {
            ServerError::InvalidRequest("expected an id or startsWith parameter".into())
        })?;
        let start = parse_number(request, "start")?.unwrap_or(0);
        let page_size = parse_number(request, "pageSize")?
            .unwrap_or(25)
            .min(self.context.config.max_page_size);
        let documents = store.starting_with(
            prefix,
            request.param("matches"),
            request.param("exclude"),
            start as usize,
            page_size as usize,
        );
        Ok(WireResponse::ok(Value::Array(documents)))
    }

    /// `GET /queries/?id=..&include=..`.
    pub fn handle_multi_load(&self, request: &WireRequest) -> ServerResult<WireResponse> {
        let store = &self.context.store;
        let results: Vec<Value> = request
            .params("id")
            .map(|key| store.get(key).unwrap_or(Value::Null))
            .collect();
        let includes = self.resolve_includes(&results, request);

        Ok(WireResponse::ok(
            MultiLoadResult { results, includes }.to_value(),
        ))
    }

    /// `GET /indexes/<name>?query=..&start=..&pageSize=..`.
    pub fn handle_query(&self, index: &str, request: &WireRequest) -> ServerResult<WireResponse> {
        let config = &self.context.config;
        let query = request.param("query").unwrap_or("");
        let start = parse_number(request, "start")?.unwrap_or(0) as usize;
        let page_size = parse_number(request, "pageSize")?
            .unwrap_or(config.default_page_size)
            .min(config.max_page_size) as usize;

        let store = &self.context.store;
        let (mut result, stale) = self.context.indexes.read(
            index,
            store,
            config.stale_reads_before_catch_up,
            |index, stale| -> ServerResult<(QueryResult, bool)> {
                let matches = index.search(query)?;
                let result = QueryResult {
                    results: matches
                        .iter()
                        .skip(start)
                        .take(page_size)
                        .map(|doc| (*doc).clone())
                        .collect(),
                    includes: Vec::new(),
                    is_stale: stale,
                    total_results: matches.len() as u64,
                    skipped_results: 0,
                    index_name: index.name.clone(),
                    index_etag: index.indexed_etag,
                };
                Ok((result, stale))
            },
        )??;
        result.includes = self.resolve_includes(&result.results, request);

        Ok(WireResponse::ok(result.to_value())
            .with_header(INDEX_STALE_HEADER, stale.to_string()))
    }

    /// `GET /suggest/<name>?term=..&field=..&max=..&accuracy=..&distance=..`.
    ///
    /// Candidates are ranked by the requested distance, Levenshtein when none
    /// is given.
    pub fn handle_suggest(&self, index: &str, request: &WireRequest) -> ServerResult<WireResponse> {
        let term = request
            .param("term")
            .ok_or_else(|| ServerError::InvalidRequest("missing term".into()))?
            .to_lowercase();
        let field = request
            .param("field")
            .ok_or_else(|| ServerError::InvalidRequest("missing field".into()))?;
        let max = parse_number(request, "max")?.unwrap_or(15) as usize;
        let accuracy = match request.param("accuracy") {
            Some(raw) => raw
                .parse::<f32>()
                .map_err(|_| ServerError::InvalidRequest(format!("invalid accuracy '{}'", raw)))?,
            None => 0.5,
        };
        let distance = match request.param("distance") {
            Some(raw) => raw
                .parse::<StringDistance>()
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?,
            None => StringDistance::Default,
        };

        let store = &self.context.store;
        let candidates = self.context.indexes.read(
            index,
            store,
            self.context.config.stale_reads_before_catch_up,
            |index, _| index.terms(field),
        )?;

        let mut scored: Vec<(f64, String)> = candidates
            .into_iter()
            .filter(|candidate| *candidate != term)
            .map(|candidate| (similarity(distance, &term, &candidate), candidate))
            .filter(|(score, _)| *score >= f64::from(accuracy))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let suggestions = scored.into_iter().take(max).map(|(_, term)| term).collect();
        let payload = serde_json::to_value(SuggestionQueryResult { suggestions })
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(WireResponse::ok(payload))
    }

    /// Loads the documents referenced through the request's include paths.
    fn resolve_includes(&self, documents: &[Value], request: &WireRequest) -> Vec<Value> {
        let mut keys = BTreeSet::new();
        for path in request.params("include") {
            for document in documents {
                match field_value(document, path) {
                    Some(Value::String(key)) => {
                        keys.insert(key.clone());
                    }
                    Some(Value::Array(items)) => {
                        keys.extend(items.iter().filter_map(|i| i.as_str().map(str::to_string)));
                    }
                    _ => {}
                }
            }
        }
        keys.iter()
            .filter_map(|key| self.context.store.get(key))
            .collect()
    }
}

fn parse_number(request: &WireRequest, name: &str) -> ServerResult<Option<u32>> {
    request
        .param(name)
        .map(|raw| {
            raw.parse::<u32>().map_err(|_| {
                ServerError::InvalidRequest(format!("invalid {} '{}'", name, raw))
            })
        })
        .transpose()
}

/// Similarity of two terms in `0.0..=1.0`.
fn similarity(distance: StringDistance, a: &str, b: &str) -> f64 {
    match distance {
        StringDistance::Default | StringDistance::Levenshtein => {
            strsim::normalized_levenshtein(a, b)
        }
        StringDistance::JaroWinkler => strsim::jaro_winkler(a, b),
        StringDistance::NGram => strsim::sorensen_dice(a, b),
    }
}
