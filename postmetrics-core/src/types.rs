//! Core domain types for postmetrics
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Subject** | The content item (e.g. a post) whose metrics are resolved |
//! | **Window** | The trailing calendar-day interval ending today (UTC) |
//! | **Chunk** | A sub-interval of the window short enough for one remote query |
//! | **Tier** | One of the ordered data sources consulted by the resolver |
//! | **Projection** | Denormalized latest value per subject and metric, used for sorting |

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a subject (post id).
pub type SubjectId = i64;

// ============================================
// Metrics
// ============================================

/// A metric tracked per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Views,
    Sessions,
}

impl Metric {
    /// Every metric, in the order they are requested from the remote API.
    pub const ALL: [Metric; 2] = [Metric::Views, Metric::Sessions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Views => "views",
            Metric::Sessions => "sessions",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "views" => Ok(Metric::Views),
            "sessions" => Ok(Metric::Sessions),
            _ => Err(format!("unknown metric: {}", s)),
        }
    }
}

/// One resolved metric value. Values are never negative; an unknown value is
/// represented by absence from a [`MetricSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricValue {
    pub subject_id: SubjectId,
    pub metric: Metric,
    pub value: u64,
}

/// Metric values for one subject over one window.
///
/// Partial sets are valid: each metric is resolved independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
    pub subject_id: SubjectId,
    pub values: BTreeMap<Metric, u64>,
}

impl MetricSet {
    /// Create an empty set for a subject.
    pub fn empty(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<u64> {
        self.values.get(&metric).copied()
    }

    pub fn insert(&mut self, metric: Metric, value: u64) {
        self.values.insert(metric, value);
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Metrics from `requested` that this set has no value for.
    pub fn missing(&self, requested: &[Metric]) -> Vec<Metric> {
        requested
            .iter()
            .copied()
            .filter(|m| !self.contains(*m))
            .collect()
    }

    /// Copy every value from `other` into this set, overwriting on conflict.
    pub fn extend(&mut self, other: &MetricSet) {
        for (metric, value) in &other.values {
            self.values.insert(*metric, *value);
        }
    }

    /// Iterate the set as individual [`MetricValue`]s.
    pub fn iter(&self) -> impl Iterator<Item = MetricValue> + '_ {
        self.values.iter().map(move |(metric, value)| MetricValue {
            subject_id: self.subject_id,
            metric: *metric,
            value: *value,
        })
    }
}

// ============================================
// Cache keys
// ============================================

/// Key shared by both cache tiers and the sort projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub subject_id: SubjectId,
    pub metric: Metric,
}

impl CacheKey {
    pub fn new(subject_id: SubjectId, metric: Metric) -> Self {
        Self { subject_id, metric }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}_30d", self.subject_id, self.metric)
    }
}

// ============================================
// Windows and chunks
// ============================================

/// Trailing window of calendar days for one subject.
///
/// Recomputed on every resolution and never persisted. The range is
/// half-open: `start_date` is included, `end_date` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub subject_id: SubjectId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl MetricWindow {
    /// The window of `days` days ending at `today`.
    pub fn trailing(subject_id: SubjectId, today: NaiveDate, days: u32) -> Self {
        Self {
            subject_id,
            start_date: today - Duration::days(i64::from(days)),
            end_date: today,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_date >= self.end_date
    }

    pub fn num_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// Half-open sub-interval `[start_date, end_date)` of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Chunk {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Chunk {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    pub fn num_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start_date, self.end_date)
    }
}
