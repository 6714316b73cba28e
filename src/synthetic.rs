use std::collections::HashMap;

use crate::formula::Formula;
use crate::models::Series;
use crate::Result;

/// Intersect named series on their exact timestamp keys.
///
/// Returns one frame per timestamp present in *every* input series, mapping
/// each series' name to its value at that timestamp. Timestamps missing from
/// any series are skipped; partial frames are never produced. Runs in time
/// linear in the total number of data points.
pub fn align(named_series: &HashMap<String, Series>) -> HashMap<String, HashMap<String, f64>> {
    let mut frames = HashMap::new();

    // Any one series works as the candidate universe: a timestamp absent
    // from it cannot be present in all of them.
    let candidate = match named_series.values().next() {
        Some(series) => series,
        None => return frames,
    };

    for timestamp in candidate.keys() {
        if !named_series.values().all(|series| series.contains_key(timestamp)) {
            continue;
        }

        let frame = named_series
            .iter()
            .map(|(name, series)| (name.clone(), series[timestamp]))
            .collect();
        frames.insert(timestamp.clone(), frame);
    }

    frames
}

/// A derived series computed by evaluating a formula over the aligned frames
/// of two or more input series.
#[derive(Debug, Clone)]
pub struct SyntheticSeries {
    name: String,
    formula: String,
    results: Series,
}

impl SyntheticSeries {
    /// Align `named_series` and evaluate `formula` at every common
    /// timestamp. Every variable in the formula must name one of the input
    /// series. The first evaluation failure aborts the whole computation;
    /// no partial results are returned.
    pub fn compute(
        name: &str,
        formula: &str,
        named_series: &HashMap<String, Series>,
    ) -> Result<Self> {
        let parsed = Formula::parse(formula)?;
        let mut results = Series::new();

        for (timestamp, frame) in align(named_series) {
            let value = parsed.evaluate(&frame)?;
            results.insert(timestamp, value);
        }

        Ok(SyntheticSeries {
            name: name.to_string(),
            formula: formula.to_string(),
            results,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// The computed series, one entry per aligned timestamp.
    pub fn results(&self) -> &Series {
        &self.results
    }

    /// Number of data points in the computed series.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
