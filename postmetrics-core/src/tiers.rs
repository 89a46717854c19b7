//! Interfaces of the data sources consulted by the resolver
//!
//! Every method is a potential I/O suspension point. Writes are last-writer-wins
//! per key and no operation spans more than one tier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::remote::RawResponse;
use crate::types::{CacheKey, Chunk, Metric, MetricSet, SubjectId};

/// Exact time-series metrics, authoritative whenever it is provisioned.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Whether the backing tables exist. Checked fresh on every resolution.
    async fn tables_exist(&self) -> Result<bool>;

    /// Metric totals for `[start_date, end_date)`.
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the tables disappeared
    /// between the availability check and the query.
    async fn get_post_metrics(
        &self,
        subject_id: SubjectId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<MetricSet>;
}

/// Side-store without expiry.
#[async_trait]
pub trait DurableCache: Send + Sync {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>>;
    async fn set(&self, key: CacheKey, value: u64) -> Result<()>;
}

/// Cache whose entries expire; expired entries read as absent.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>>;
    async fn set(&self, key: CacheKey, value: u64, ttl: Duration) -> Result<()>;
}

/// Best-effort index of the latest resolved value, used to sort listings.
#[async_trait]
pub trait SortProjection: Send + Sync {
    async fn record(&self, key: CacheKey, value: u64) -> Result<()>;

    /// Subjects ordered by `metric`, highest first.
    async fn ranked(&self, metric: Metric, limit: usize) -> Result<Vec<(SubjectId, u64)>>;
}

/// Lookup of the page path a subject is published under.
#[async_trait]
pub trait PagePaths: Send + Sync {
    async fn page_path(&self, subject_id: SubjectId) -> Result<Option<String>>;
}

/// Per-chunk access to the remote analytics API.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    async fn fetch_chunk(
        &self,
        page_path: &str,
        metrics: &[Metric],
        chunk: &Chunk,
    ) -> Result<RawResponse>;
}
