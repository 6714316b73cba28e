pub mod client;
pub mod error;
pub mod formula;
pub mod logging;
pub mod metric;
pub mod models;
pub mod query;
pub mod response;
pub mod synthetic;
pub mod transport;

pub use client::{ClientConfig, QueryOutcome, SuggestOutcome, TsClient, WriteOutcome};
pub use error::{ClientError, Result};
pub use formula::Formula;
pub use metric::{Metric, MetricBuilder};
pub use models::{Series, SuggestKind};
pub use query::{Downsample, Query, QueryBuilder, QueryFormat, SubQuery};
pub use response::QueryResponse;
pub use synthetic::{align, SyntheticSeries};
pub use transport::{
    HttpTransport, QueryTransport, RawResponse, ReadRequest, TcpWriteChannel, WriteChannel,
};
