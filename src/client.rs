use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metric::Metric;
use crate::models::{Series, SuggestKind};
use crate::query::Query;
use crate::response::QueryResponse;
use crate::synthetic::SyntheticSeries;
use crate::transport::{
    HttpTransport, QueryTransport, ReadRequest, TcpWriteChannel, WriteChannel,
};
use crate::{ClientError, Result};

/// Client-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// When set, read operations return the resolved request URI and write
    /// operations return the formatted put line; nothing touches the
    /// network.
    pub dry_run: bool,
    /// Version of the TSDB this client talks to.
    pub version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            dry_run: false,
            version: "2.0".to_string(),
        }
    }
}

/// Outcome of a single read query: a wrapped response, or the request URI
/// when the client is in dry-run mode or the query asked for a graph format.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Response(QueryResponse),
    Uri(String),
}

impl QueryOutcome {
    pub fn as_response(&self) -> Option<&QueryResponse> {
        match self {
            QueryOutcome::Response(response) => Some(response),
            QueryOutcome::Uri(_) => None,
        }
    }

    pub fn into_response(self) -> Option<QueryResponse> {
        match self {
            QueryOutcome::Response(response) => Some(response),
            QueryOutcome::Uri(_) => None,
        }
    }

    pub fn as_uri(&self) -> Option<&str> {
        match self {
            QueryOutcome::Uri(uri) => Some(uri),
            QueryOutcome::Response(_) => None,
        }
    }
}

/// Outcome of a suggest call.
#[derive(Debug, Clone)]
pub enum SuggestOutcome {
    Suggestions(Vec<String>),
    Uri(String),
}

/// Outcome of a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Dry-run: the put line that would have been sent.
    Line(String),
}

/// Client for an OpenTSDB-compatible time-series database.
///
/// Reads go over HTTP (`api/query`, `api/suggest`, `api/version`); writes go
/// over the line-oriented put protocol. Both sides sit behind trait seams so
/// tests can swap in fakes.
pub struct TsClient {
    host: String,
    port: u16,
    base_url: String,
    config: ClientConfig,
    queries: Arc<dyn QueryTransport>,
    writes: Arc<dyn WriteChannel>,
}

impl Default for TsClient {
    fn default() -> Self {
        TsClient::new("127.0.0.1", 4242)
    }
}

impl TsClient {
    /// Connect to the TSDB at `host:port` over HTTP, with default
    /// configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let base_url = format!("http://{}:{}/", host, port);
        let queries = Arc::new(HttpTransport::new(base_url.clone()));
        let writes = Arc::new(TcpWriteChannel::new(host.clone(), port));
        Self::with_transports(host, port, queries, writes)
    }

    /// Build a client over caller-supplied transports.
    pub fn with_transports(
        host: impl Into<String>,
        port: u16,
        queries: Arc<dyn QueryTransport>,
        writes: Arc<dyn WriteChannel>,
    ) -> Self {
        let host = host.into();
        TsClient {
            base_url: format!("http://{}:{}/", host, port),
            host,
            port,
            config: ClientConfig::default(),
            queries,
            writes,
        }
    }

    pub fn configure(&mut self, config: ClientConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the TSDB version endpoint. True iff the call succeeds.
    pub async fn is_reachable(&self) -> bool {
        self.queries.get("api/version", &[], true).await.is_ok()
    }

    /// Ask the TSDB for metric/tag name suggestions matching `query`.
    pub async fn suggest(
        &self,
        query: &str,
        kind: SuggestKind,
        max: u32,
    ) -> Result<SuggestOutcome> {
        if self.config.dry_run {
            return Ok(SuggestOutcome::Uri(self.suggest_uri(query, kind, max)));
        }

        let params = vec![
            ("type".to_string(), kind.as_str().to_string()),
            ("q".to_string(), query.to_string()),
            ("max".to_string(), max.to_string()),
        ];
        let raw = self.queries.get("api/suggest", &params, true).await?;
        let suggestions = serde_json::from_str(&raw.body)?;
        Ok(SuggestOutcome::Suggestions(suggestions))
    }

    /// The full suggest URI in the context of this client.
    pub fn suggest_uri(&self, query: &str, kind: SuggestKind, max: u32) -> String {
        format!(
            "{}api/suggest?type={}&q={}&max={}",
            self.base_url,
            kind.as_str(),
            query,
            max
        )
    }

    /// Write one data point over the put protocol. In dry-run mode the
    /// formatted line is returned instead of being sent.
    pub async fn write(&self, metric: &Metric) -> Result<WriteOutcome> {
        let line = format!("put {}", metric);
        if self.config.dry_run {
            return Ok(WriteOutcome::Line(line));
        }

        info!(metric = metric.name(), "writing data point");
        self.writes.send_line(&line).await.map_err(|_| {
            ClientError::Transport(format!(
                "Failed to insert metric {} with value of {} into OpenTSDB.",
                metric.name(),
                metric.value()
            ))
        })?;
        Ok(WriteOutcome::Written)
    }

    /// The full query URI in the context of this client.
    pub fn query_uri(&self, query: &Query) -> String {
        format!("{}api/query?{}", self.base_url, query.to_query_string())
    }

    /// Run one read query. Dry-run mode, or a graph format on the query,
    /// short-circuits to the request URI without a network call.
    pub async fn run_query(&self, query: &Query) -> Result<QueryOutcome> {
        if self.config.dry_run || query.format().is_graph() {
            return Ok(QueryOutcome::Uri(self.query_uri(query)));
        }

        let raw = self.queries.get("api/query", &query.request(), true).await?;
        Ok(QueryOutcome::Response(QueryResponse::from_raw(raw)?))
    }

    /// Run an ordered batch of queries over one pipelined round-trip.
    ///
    /// Returns exactly one response per query, in input order. Pipelined
    /// requests are not safely retryable as a unit, so the batch goes out
    /// with retry-safety relaxed. A transport failure fails the whole batch;
    /// remote errors inside a successful batch are captured per-response.
    pub async fn run_queries(&self, queries: &[Query]) -> Result<Vec<QueryResponse>> {
        let requests: Vec<ReadRequest> = queries
            .iter()
            .map(|query| ReadRequest {
                path: "api/query".to_string(),
                params: query.request(),
            })
            .collect();

        debug!(count = requests.len(), "running pipelined query batch");
        let raws = self.queries.get_batch(&requests, false).await?;
        raws.into_iter().map(QueryResponse::from_raw).collect()
    }

    /// Run a synthetic query: execute every named query, feed the resulting
    /// series into `formula` keyed by parameter name, and compute the
    /// derived series over their aligned timestamps.
    ///
    /// Any per-query failure, including a remote error response, aborts the
    /// whole computation. When a query returns more than one series the
    /// first one wins.
    pub async fn run_synthetic_query(
        &self,
        name: &str,
        formula: &str,
        queries: &HashMap<String, Query>,
    ) -> Result<SyntheticSeries> {
        if self.config.dry_run {
            return Err(ClientError::Validation(
                "synthetic queries cannot run in dry-run mode".to_string(),
            ));
        }

        let mut named_series: HashMap<String, Series> = HashMap::with_capacity(queries.len());
        for (parameter, query) in queries {
            let response = match self.run_query(query).await? {
                QueryOutcome::Response(response) => response,
                QueryOutcome::Uri(uri) => {
                    return Err(ClientError::Validation(format!(
                        "query '{}' resolved to a graph URI: {}",
                        parameter, uri
                    )));
                }
            };

            if response.is_error() {
                return Err(ClientError::Remote {
                    status: response.status(),
                    message: response
                        .error_message()
                        .unwrap_or("query failed")
                        .to_string(),
                });
            }
            if response.len() > 1 {
                warn!(
                    parameter = %parameter,
                    series = response.len(),
                    "query returned multiple series; using the first"
                );
            }

            let series = response.data_points(0).ok_or_else(|| {
                ClientError::Validation(format!(
                    "query '{}' returned no data points",
                    parameter
                ))
            })?;
            named_series.insert(parameter.clone(), series);
        }

        SyntheticSeries::compute(name, formula, &named_series)
    }
}
