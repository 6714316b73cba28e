use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One time series: timestamp key mapped to sample value. Keys are kept as
/// the exact strings the TSDB returned; alignment matches on string equality.
pub type Series = HashMap<String, f64>;

/// Name spaces searchable through the suggest API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestKind {
    Metrics,
    TagKeys,
    TagValues,
}

impl SuggestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestKind::Metrics => "metrics",
            SuggestKind::TagKeys => "tagk",
            SuggestKind::TagValues => "tagv",
        }
    }
}

impl Default for SuggestKind {
    fn default() -> Self {
        SuggestKind::Metrics
    }
}
