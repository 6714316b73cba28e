use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

/// A single data point to write into OpenTSDB.
///
/// Validated at construction through [`MetricBuilder`]; a `Metric` is never
/// partially constructed. Tags are kept sorted by key so the rendered put
/// line is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    name: String,
    value: f64,
    timestamp: i64,
    tags: BTreeMap<String, String>,
}

impl Metric {
    pub fn builder() -> MetricBuilder {
        MetricBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Epoch seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

/// Renders the body of the write-protocol line:
/// `<name> <timestamp> <value> <tag=value ...>`, trailing whitespace trimmed.
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self
            .tags
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ");

        if tags.is_empty() {
            write!(f, "{} {} {}", self.name, self.timestamp, self.value)
        } else {
            write!(f, "{} {} {} {}", self.name, self.timestamp, self.value, tags)
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricBuilder {
    name: Option<String>,
    value: Option<f64>,
    timestamp: Option<i64>,
    tags: BTreeMap<String, String>,
}

impl MetricBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Epoch seconds. Defaults to the current time when omitted.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.tags.insert(key.into(), value.to_string());
        self
    }

    pub fn build(self) -> Result<Metric> {
        let name = self.name.ok_or_else(|| {
            ClientError::Validation("name is required to write into OpenTSDB.".to_string())
        })?;
        let value = self.value.ok_or_else(|| {
            ClientError::Validation("value is required to write into OpenTSDB.".to_string())
        })?;
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        Ok(Metric {
            name,
            value,
            timestamp,
            tags: self.tags,
        })
    }
}
