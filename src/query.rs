use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

/// Response format requested from the query endpoint. Graph formats are
/// never fetched by the client; they short-circuit to a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryFormat {
    Json,
    Ascii,
    Png,
}

impl QueryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryFormat::Json => "json",
            QueryFormat::Ascii => "ascii",
            QueryFormat::Png => "png",
        }
    }

    /// True for formats rendered by the TSDB as an image.
    pub fn is_graph(&self) -> bool {
        matches!(self, QueryFormat::Png)
    }
}

impl Default for QueryFormat {
    fn default() -> Self {
        QueryFormat::Json
    }
}

/// Downsampling specification for one sub-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downsample {
    pub period: String,
    pub function: String,
}

/// One metric sub-query inside a [`Query`].
///
/// The metric label is required; the aggregator defaults to `sum`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    metric: Option<String>,
    aggregator: Option<String>,
    rate: bool,
    tags: BTreeMap<String, String>,
    downsample: Option<Downsample>,
}

impl SubQuery {
    pub fn metric(name: impl Into<String>) -> Self {
        SubQuery {
            metric: Some(name.into()),
            ..SubQuery::default()
        }
    }

    pub fn aggregator(mut self, aggregator: impl Into<String>) -> Self {
        self.aggregator = Some(aggregator.into());
        self
    }

    pub fn rate(mut self) -> Self {
        self.rate = true;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.tags.insert(key.into(), value.to_string());
        self
    }

    pub fn downsample(mut self, period: impl Into<String>, function: impl Into<String>) -> Self {
        self.downsample = Some(Downsample {
            period: period.into(),
            function: function.into(),
        });
        self
    }

    fn validate(&self) -> Result<()> {
        match &self.metric {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(ClientError::Validation(
                "Metric label must be present for query to run".to_string(),
            )),
        }
    }

    /// Renders the `m` request parameter:
    /// `aggregator:[period-function:][rate:]metric[{tag=value,...}]`.
    fn to_parameter(&self) -> String {
        let mut parts = vec![self
            .aggregator
            .clone()
            .unwrap_or_else(|| "sum".to_string())];

        if let Some(downsample) = &self.downsample {
            parts.push(format!("{}-{}", downsample.period, downsample.function));
        }
        if self.rate {
            parts.push("rate".to_string());
        }

        let metric = self.metric.clone().unwrap_or_default();
        if self.tags.is_empty() {
            parts.push(metric);
        } else {
            let tags = self
                .tags
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("{}{{{}}}", metric, tags));
        }

        parts.join(":")
    }
}

/// A read query against the TSDB query endpoint.
///
/// Validated at construction through [`QueryBuilder`] and consumed read-only
/// by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    format: QueryFormat,
    start: String,
    end: Option<String>,
    sub_queries: Vec<SubQuery>,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn format(&self) -> QueryFormat {
        self.format
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    pub fn sub_queries(&self) -> &[SubQuery] {
        &self.sub_queries
    }

    /// Request parameters for the query endpoint, one `m` entry per
    /// sub-query, in declaration order.
    pub fn request(&self) -> Vec<(String, String)> {
        let mut params = vec![("start".to_string(), self.start.clone())];
        if let Some(end) = &self.end {
            params.push(("end".to_string(), end.clone()));
        }
        for sub_query in &self.sub_queries {
            params.push(("m".to_string(), sub_query.to_parameter()));
        }
        params
    }

    /// The query string for the request URI. Non-JSON formats are appended
    /// as a bare trailing token, the way the TSDB's graph URLs expect.
    pub fn to_query_string(&self) -> String {
        let mut rendered = self
            .request()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        if self.format != QueryFormat::Json {
            rendered.push('&');
            rendered.push_str(self.format.as_str());
        }
        rendered
    }
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    format: QueryFormat,
    start: Option<String>,
    end: Option<String>,
    sub_queries: Option<Vec<SubQuery>>,
}

impl QueryBuilder {
    pub fn format(mut self, format: QueryFormat) -> Self {
        self.format = format;
        self
    }

    /// Start of the time range: epoch seconds or a relative expression like
    /// `"1h-ago"`.
    pub fn start(mut self, start: impl ToString) -> Self {
        self.start = Some(start.to_string());
        self
    }

    /// End of the time range; the TSDB treats an omitted end as "now".
    pub fn end(mut self, end: impl ToString) -> Self {
        self.end = Some(end.to_string());
        self
    }

    pub fn sub_query(mut self, sub_query: SubQuery) -> Self {
        self.sub_queries.get_or_insert_with(Vec::new).push(sub_query);
        self
    }

    pub fn sub_queries(mut self, sub_queries: Vec<SubQuery>) -> Self {
        self.sub_queries = Some(sub_queries);
        self
    }

    pub fn build(self) -> Result<Query> {
        let start = self.start.ok_or_else(|| {
            ClientError::Validation("start is a required parameter.".to_string())
        })?;
        let sub_queries = self.sub_queries.ok_or_else(|| {
            ClientError::Validation("m is a required parameter.".to_string())
        })?;
        if sub_queries.is_empty() {
            return Err(ClientError::Validation(
                "m parameter must not be empty.".to_string(),
            ));
        }
        for sub_query in &sub_queries {
            sub_query.validate()?;
        }

        Ok(Query {
            format: self.format,
            start,
            end: self.end,
            sub_queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_start() {
        let err = Query::builder()
            .format(QueryFormat::Ascii)
            .end(134_567)
            .sub_query(SubQuery::metric("mtest").aggregator("sum"))
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: start is a required parameter."
        );
    }

    #[test]
    fn test_missing_m() {
        let err = Query::builder()
            .format(QueryFormat::Ascii)
            .start(123_456)
            .end(134_567)
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: m is a required parameter.");
    }

    #[test]
    fn test_empty_m() {
        let err = Query::builder()
            .format(QueryFormat::Ascii)
            .start(123_456)
            .end(134_567)
            .sub_queries(vec![])
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: m parameter must not be empty."
        );
    }

    #[test]
    fn test_missing_metric_label() {
        let err = Query::builder()
            .format(QueryFormat::Ascii)
            .start(123_456)
            .end(134_567)
            .sub_query(SubQuery::default())
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Metric label must be present for query to run"
        );
    }

    #[test]
    fn test_aggregator_without_metric_label() {
        let err = Query::builder()
            .format(QueryFormat::Ascii)
            .start(123_456)
            .end(134_567)
            .sub_query(SubQuery::default().aggregator("sum"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_valid_query() {
        let query = Query::builder()
            .format(QueryFormat::Json)
            .start(123_456)
            .end(134_567)
            .sub_query(
                SubQuery::metric("mtest")
                    .aggregator("sum")
                    .rate()
                    .downsample("24h", "sum"),
            )
            .build()
            .unwrap();

        assert_eq!(query.format(), QueryFormat::Json);
        assert_eq!(query.start(), "123456");
        assert_eq!(query.end(), Some("134567"));
        assert_eq!(query.sub_queries().len(), 1);
    }

    #[test]
    fn test_sub_query_parameter_rendering() {
        let sub_query = SubQuery::metric("sys.numa.allocation")
            .aggregator("sum")
            .rate()
            .downsample("10m", "avg")
            .tag("host", "web01");
        assert_eq!(
            sub_query.to_parameter(),
            "sum:10m-avg:rate:sys.numa.allocation{host=web01}"
        );
    }

    #[test]
    fn test_default_aggregator() {
        assert_eq!(SubQuery::metric("mtest").to_parameter(), "sum:mtest");
    }

    #[test]
    fn test_tags_render_sorted() {
        let sub_query = SubQuery::metric("m").tag("zone", "east").tag("host", "web01");
        assert_eq!(sub_query.to_parameter(), "sum:m{host=web01,zone=east}");
    }

    #[test]
    fn test_request_parameters() {
        let query = Query::builder()
            .start("1h-ago")
            .sub_query(SubQuery::metric("a"))
            .sub_query(SubQuery::metric("b").rate())
            .build()
            .unwrap();

        assert_eq!(
            query.request(),
            vec![
                ("start".to_string(), "1h-ago".to_string()),
                ("m".to_string(), "sum:a".to_string()),
                ("m".to_string(), "sum:rate:b".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_string_rendering() {
        let query = Query::builder()
            .format(QueryFormat::Png)
            .start(1_420_676_714)
            .end(1_420_676_774)
            .sub_query(SubQuery::metric("sys.numa.allocation").tag("host", "web01"))
            .build()
            .unwrap();

        assert_eq!(
            query.to_query_string(),
            "start=1420676714&end=1420676774&m=sum:sys.numa.allocation{host=web01}&png"
        );
    }

    #[test]
    fn test_json_query_string_has_no_format_token() {
        let query = Query::builder()
            .start(1)
            .sub_query(SubQuery::metric("m"))
            .build()
            .unwrap();
        assert_eq!(query.to_query_string(), "start=1&m=sum:m");
    }
}
