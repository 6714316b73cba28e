use serde_json::Value;

use crate::models::Series;
use crate::transport::RawResponse;
use crate::Result;

/// Wraps one raw query-endpoint response: status code, parsed payload and
/// the extracted error message, if any.
///
/// Remote errors are captured here rather than raised; callers check
/// [`QueryResponse::is_error`].
#[derive(Debug, Clone)]
pub struct QueryResponse {
    status: u16,
    payload: Value,
    error_message: Option<String>,
}

impl QueryResponse {
    pub fn from_raw(raw: RawResponse) -> Result<Self> {
        let payload = if raw.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw.body)?
        };

        let mut response = QueryResponse {
            status: raw.status,
            payload,
            error_message: None,
        };
        if response.is_error() && response.len() > 0 {
            response.error_message = response.payload["error"]["message"]
                .as_str()
                .map(str::to_string);
        }
        Ok(response)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// True iff the status code is outside the 2xx range.
    pub fn is_error(&self) -> bool {
        !(200..300).contains(&self.status)
    }

    /// The parsed payload, verbatim: an array of series objects on success,
    /// an error object otherwise.
    pub fn results(&self) -> &Value {
        &self.payload
    }

    /// Element count of the payload: array length or object entry count.
    pub fn len(&self) -> usize {
        match &self.payload {
            Value::Array(items) => items.len(),
            Value::Object(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populated only for error responses with a non-empty payload.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The data points (`dps`) of the series at `index`, or `None` when the
    /// payload has no such series or its points are not numeric.
    pub fn data_points(&self, index: usize) -> Option<Series> {
        let points = self.payload.as_array()?.get(index)?.get("dps")?.as_object()?;

        let mut series = Series::with_capacity(points.len());
        for (timestamp, value) in points {
            series.insert(timestamp.clone(), value.as_f64()?);
        }
        Some(series)
    }
}
