//! Summing chunk responses into window totals
//!
//! Each response carries a `data` array of daily rows. A row contributes its
//! numeric value for every requested metric it has; missing or non-numeric
//! fields contribute zero. Totals are plain sums, so chunks can be added in
//! any order and partial aggregators merged.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Metric, MetricSet, SubjectId};

use super::RawResponse;

#[derive(Debug, Deserialize)]
struct TrafficResponse {
    data: Vec<Value>,
}

/// Per-metric totals of one response body.
pub fn parse_response(body: &str, metrics: &[Metric]) -> Result<BTreeMap<Metric, u64>> {
    let response: TrafficResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(format!("invalid response: {}", e)))?;

    let mut totals: BTreeMap<Metric, u64> = metrics.iter().map(|m| (*m, 0)).collect();
    for row in &response.data {
        for (metric, total) in totals.iter_mut() {
            *total = total.saturating_add(numeric_field(row, metric.as_str()));
        }
    }

    Ok(totals)
}

/// Non-negative integer value of `field`, or zero.
fn numeric_field(row: &Value, field: &str) -> u64 {
    match row.get(field) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map(|f| f.round() as u64)
                .unwrap_or(0)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

/// Accumulates chunk responses for one subject.
#[derive(Debug, Clone)]
pub struct ResponseAggregator {
    totals: BTreeMap<Metric, u64>,
    chunks_parsed: usize,
    chunks_failed: usize,
}

impl ResponseAggregator {
    /// Start with a zero total for every requested metric.
    pub fn new(metrics: &[Metric]) -> Self {
        Self {
            totals: metrics.iter().map(|m| (*m, 0)).collect(),
            chunks_parsed: 0,
            chunks_failed: 0,
        }
    }

    /// Add one chunk's response.
    ///
    /// A body that fails to parse contributes nothing; the error is returned
    /// for the caller to report and aggregation stays usable.
    pub fn add(&mut self, response: &RawResponse) -> Result<()> {
        let metrics: Vec<Metric> = self.totals.keys().copied().collect();
        match parse_response(&response.body, &metrics) {
            Ok(chunk_totals) => {
                for (metric, value) in chunk_totals {
                    let total = self.totals.entry(metric).or_insert(0);
                    *total = total.saturating_add(value);
                }
                self.chunks_parsed += 1;
                Ok(())
            }
            Err(e) => {
                self.chunks_failed += 1;
                Err(e)
            }
        }
    }

    /// Record a chunk that produced no response at all.
    pub fn record_missing(&mut self) {
        self.chunks_failed += 1;
    }

    /// Combine two partial aggregations.
    pub fn merge(mut self, other: ResponseAggregator) -> Self {
        for (metric, value) in other.totals {
            let total = self.totals.entry(metric).or_insert(0);
            *total = total.saturating_add(value);
        }
        self.chunks_parsed += other.chunks_parsed;
        self.chunks_failed += other.chunks_failed;
        self
    }

    /// Number of chunks whose body was parsed.
    pub fn chunks_parsed(&self) -> usize {
        self.chunks_parsed
    }

    /// Number of chunks that contributed nothing because of an error.
    pub fn chunks_failed(&self) -> usize {
        self.chunks_failed
    }

    pub fn finish(self, subject_id: SubjectId) -> MetricSet {
        MetricSet {
            subject_id,
            values: self.totals,
        }
    }

    /// Sum a batch of responses, one partial per response merged together.
    ///
    /// Unparseable bodies contribute nothing.
    pub fn aggregate(subject_id: SubjectId, responses: &[RawResponse], metrics: &[Metric]) -> MetricSet {
        responses
            .iter()
            .map(|response| {
                let mut partial = Self::new(metrics);
                let _ = partial.add(response);
                partial
            })
            .fold(Self::new(metrics), Self::merge)
            .finish(subject_id)
    }
}
