//! Tiered metrics resolution
//!
//! The resolver is the single entry point for presentation code. For each
//! subject it walks the tiers in strict priority order:
//!
//! ```text
//!  1. PrimaryStore ──available──▶ final result (zeros included)
//!        │ unavailable
//!        ▼
//!  2. DurableCache   (per metric)
//!  3. ExpiringCache  (per metric, only for metrics 2 missed)
//!  4. TrafficSource  (only for metrics 2 and 3 missed)
//!        └─▶ writes both cache tiers
//!
//!  Every value returned is also recorded in the SortProjection.
//! ```
//!
//! While the primary store is available, tiers 2-4 are never consulted, no
//! matter what they hold. Availability is checked on every call.
//!
//! Failures in any tier are logged here and degrade to "this tier produced
//! nothing"; callers always get a [`MetricSet`], possibly empty, unless they
//! cancelled the resolution.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::chunker;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::remote::{RemoteAnalyticsClient, ResponseAggregator};
use crate::tiers::{DurableCache, ExpiringCache, PagePaths, PrimaryStore, SortProjection, TrafficSource};
use crate::types::{CacheKey, Metric, MetricSet, MetricWindow, SubjectId};

/// Data sources the resolver consults, injected at construction.
#[derive(Clone)]
pub struct Tiers {
    pub primary: Arc<dyn PrimaryStore>,
    pub durable: Arc<dyn DurableCache>,
    pub short_lived: Arc<dyn ExpiringCache>,
    pub projection: Arc<dyn SortProjection>,
    pub paths: Arc<dyn PagePaths>,
    /// `None` disables the remote tier
    pub remote: Option<Arc<dyn TrafficSource>>,
}

impl Tiers {
    /// Every local tier backed by one database.
    pub fn from_database(db: Arc<Database>, remote: Option<Arc<dyn TrafficSource>>) -> Self {
        Self {
            primary: db.clone(),
            durable: db.clone(),
            short_lived: db.clone(),
            projection: db.clone(),
            paths: db,
            remote,
        }
    }
}

/// Tunables for a resolver.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub window_days: u32,
    pub max_span_days: u32,
    pub short_ttl: Duration,
    pub max_concurrent_chunks: usize,
    pub max_concurrent_subjects: usize,
    /// Upper bound on a single chunk fetch
    pub fetch_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_days: config.resolver.window_days,
            max_span_days: config.resolver.max_span_days,
            short_ttl: config.resolver.short_ttl(),
            max_concurrent_chunks: config.fetch.max_concurrent_chunks.max(1),
            max_concurrent_subjects: config.resolver.max_concurrent_subjects.max(1),
            fetch_timeout: config.fetch.timeout(),
        }
    }
}

/// Outcome of a cancellable resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(MetricSet),
    /// Aborted by the caller; nothing was written to any tier
    Cancelled,
}

impl Resolution {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Resolution::Cancelled)
    }

    pub fn into_metrics(self) -> Option<MetricSet> {
        match self {
            Resolution::Resolved(set) => Some(set),
            Resolution::Cancelled => None,
        }
    }
}

/// Resolves trailing-window metrics through the tier cascade.
#[derive(Clone)]
pub struct MetricsResolver {
    tiers: Tiers,
    settings: ResolverSettings,
    fixed_today: Option<NaiveDate>,
}

impl MetricsResolver {
    pub fn new(tiers: Tiers, settings: ResolverSettings) -> Self {
        Self {
            tiers,
            settings,
            fixed_today: None,
        }
    }

    /// Build a resolver over `db` with the remote tier configured from `config`.
    ///
    /// Without complete, valid analytics credentials the remote tier stays
    /// disabled; only an invalid resolver section is an error.
    pub fn from_config(config: &Config, db: Arc<Database>) -> Result<Self> {
        config.resolver.validate()?;

        let remote: Option<Arc<dyn TrafficSource>> = if !config.analytics.is_ready() {
            tracing::info!("Analytics credentials not configured, remote tier disabled");
            None
        } else {
            match RemoteAnalyticsClient::new(&config.analytics, &config.fetch) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid analytics configuration, remote tier disabled");
                    None
                }
            }
        };

        Ok(Self::new(
            Tiers::from_database(db, remote),
            ResolverSettings::from_config(config),
        ))
    }

    /// Pin "today" instead of reading the UTC clock.
    pub fn with_fixed_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    fn window(&self, subject_id: SubjectId) -> MetricWindow {
        let today = self
            .fixed_today
            .unwrap_or_else(|| Utc::now().date_naive());
        MetricWindow::trailing(subject_id, today, self.settings.window_days)
    }

    /// Resolve both metrics for one subject.
    pub async fn resolve(&self, subject_id: SubjectId) -> MetricSet {
        let never = CancellationToken::new();
        self.resolve_cancellable(subject_id, &never)
            .await
            .into_metrics()
            .unwrap_or_else(|| MetricSet::empty(subject_id))
    }

    /// Re-query the primary store and overwrite the projection.
    ///
    /// Only bypasses the cache tiers while the primary store is available;
    /// otherwise this is an ordinary [`resolve`](Self::resolve).
    pub async fn force_refresh(&self, subject_id: SubjectId) -> MetricSet {
        let window = self.window(subject_id);
        match self.query_primary(&window).await {
            Ok(set) => {
                tracing::info!(subject_id, "Refreshed metrics from primary store");
                self.project(&set).await;
                set
            }
            Err(Error::StoreUnavailable(reason)) => {
                tracing::debug!(
                    subject_id,
                    reason = %reason,
                    "Primary store unavailable, refresh falls back to cascade"
                );
                let never = CancellationToken::new();
                self.resolve_fallback(&window, &never)
                    .await
                    .into_metrics()
                    .unwrap_or_else(|| MetricSet::empty(subject_id))
            }
            Err(e) => {
                tracing::warn!(subject_id, error = %e, "Primary store refresh failed");
                MetricSet::empty(subject_id)
            }
        }
    }

    /// Resolve one subject, aborting if `cancel` fires first.
    pub async fn resolve_cancellable(
        &self,
        subject_id: SubjectId,
        cancel: &CancellationToken,
    ) -> Resolution {
        if cancel.is_cancelled() {
            return Resolution::Cancelled;
        }

        let window = self.window(subject_id);
        match self.query_primary(&window).await {
            Ok(set) => {
                if cancel.is_cancelled() {
                    return Resolution::Cancelled;
                }
                tracing::debug!(subject_id, tier = "primary", "Resolved metrics");
                self.project(&set).await;
                Resolution::Resolved(set)
            }
            Err(Error::StoreUnavailable(reason)) => {
                tracing::debug!(
                    subject_id,
                    reason = %reason,
                    "Primary store unavailable, using fallback tiers"
                );
                self.resolve_fallback(&window, cancel).await
            }
            Err(e) => {
                tracing::warn!(
                    subject_id,
                    error = %e,
                    "Primary store query failed, reporting no data"
                );
                Resolution::Resolved(MetricSet::empty(subject_id))
            }
        }
    }

    /// Resolve a listing page, at most `max_concurrent_subjects` at a time.
    ///
    /// Results keep the order of `subject_ids`.
    pub async fn resolve_many(
        &self,
        subject_ids: &[SubjectId],
        cancel: &CancellationToken,
    ) -> Vec<(SubjectId, Resolution)> {
        stream::iter(subject_ids.iter().copied())
            .map(|subject_id| async move {
                (subject_id, self.resolve_cancellable(subject_id, cancel).await)
            })
            .buffered(self.settings.max_concurrent_subjects)
            .collect()
            .await
    }

    /// Subjects ordered by their projected value of `metric`.
    pub async fn ranked(&self, metric: Metric, limit: usize) -> Result<Vec<(SubjectId, u64)>> {
        self.tiers.projection.ranked(metric, limit).await
    }

    // ============================================
    // Tier 1: primary store
    // ============================================

    /// Query the primary store. `StoreUnavailable` is the only error that
    /// sends resolution down the cascade.
    async fn query_primary(&self, window: &MetricWindow) -> Result<MetricSet> {
        let available = self
            .tiers
            .primary
            .tables_exist()
            .await
            .map_err(|e| Error::StoreQuery(format!("availability check failed: {}", e)))?;
        if !available {
            return Err(Error::StoreUnavailable(
                "backing tables do not exist".to_string(),
            ));
        }

        let mut set = self
            .tiers
            .primary
            .get_post_metrics(window.subject_id, window.start_date, window.end_date)
            .await
            .map_err(|e| match e {
                Error::StoreUnavailable(_) | Error::StoreQuery(_) => e,
                other => Error::StoreQuery(other.to_string()),
            })?;
        set.subject_id = window.subject_id;
        Ok(set)
    }

    // ============================================
    // Tiers 2-4: fallback cascade
    // ============================================

    async fn resolve_fallback(
        &self,
        window: &MetricWindow,
        cancel: &CancellationToken,
    ) -> Resolution {
        let subject_id = window.subject_id;
        let mut cached = MetricSet::empty(subject_id);

        for metric in Metric::ALL {
            let key = CacheKey::new(subject_id, metric);
            match self.tiers.durable.get(key).await {
                Ok(Some(value)) => cached.insert(metric, value),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(subject_id, %metric, error = %e, "Durable cache read failed");
                }
            }
        }

        for metric in cached.missing(&Metric::ALL) {
            let key = CacheKey::new(subject_id, metric);
            match self.tiers.short_lived.get(key).await {
                Ok(Some(value)) => cached.insert(metric, value),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(subject_id, %metric, error = %e, "Short-lived cache read failed");
                }
            }
        }

        let missing = cached.missing(&Metric::ALL);
        let fetched = if missing.is_empty() {
            None
        } else {
            match self.fetch_remote(window, &missing, cancel).await {
                Ok(fetched) => fetched,
                Err(Error::Cancelled) => {
                    tracing::debug!(subject_id, "Resolution cancelled during remote fetch");
                    return Resolution::Cancelled;
                }
                Err(e) => {
                    tracing::warn!(subject_id, error = %e, "Remote fetch failed");
                    None
                }
            }
        };

        if cancel.is_cancelled() {
            return Resolution::Cancelled;
        }

        tracing::debug!(
            subject_id,
            cached = cached.len(),
            fetched = fetched.is_some(),
            "Resolved metrics from fallback tiers"
        );
        self.project(&cached).await;

        let mut resolved = cached;
        if let Some(fetched) = fetched {
            let mut remote_set = MetricSet::empty(subject_id);
            for metric in &missing {
                remote_set.insert(*metric, fetched.get(*metric).unwrap_or(0));
            }
            self.write_caches(&remote_set).await;
            self.project(&remote_set).await;
            resolved.extend(&remote_set);
        }

        Resolution::Resolved(resolved)
    }

    /// Fetch and aggregate `metrics` over the window.
    ///
    /// `Ok(None)` means the remote tier had nothing to offer: it is disabled,
    /// the subject has no page path, the window is empty, or no chunk came
    /// back usable.
    async fn fetch_remote(
        &self,
        window: &MetricWindow,
        metrics: &[Metric],
        cancel: &CancellationToken,
    ) -> Result<Option<MetricSet>> {
        let subject_id = window.subject_id;
        let Some(remote) = self.tiers.remote.as_ref() else {
            return Ok(None);
        };
        if window.is_empty() {
            return Ok(None);
        }
        let Some(page_path) = self.tiers.paths.page_path(subject_id).await? else {
            tracing::debug!(subject_id, "No page path known, skipping remote fetch");
            return Ok(None);
        };

        let chunks = chunker::split(window.start_date, window.end_date, self.settings.max_span_days)?;
        let fetch_timeout = self.settings.fetch_timeout;
        let page_path = page_path.as_str();

        // Each chunk folds into its own aggregator; partials merge in
        // completion order.
        let fetches = stream::iter(chunks)
            .map(|chunk| async move {
                let mut partial = ResponseAggregator::new(metrics);
                let result =
                    match tokio::time::timeout(fetch_timeout, remote.fetch_chunk(page_path, metrics, &chunk)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Transport(format!(
                            "chunk {} timed out after {:?}",
                            chunk, fetch_timeout
                        ))),
                    };
                match result {
                    Ok(response) => {
                        if let Err(e) = partial.add(&response) {
                            tracing::warn!(subject_id, %chunk, error = %e, "Discarding unparseable chunk");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(subject_id, %chunk, error = %e, "Chunk fetch failed");
                        partial.record_missing();
                    }
                }
                partial
            })
            .buffer_unordered(self.settings.max_concurrent_chunks)
            .fold(ResponseAggregator::new(metrics), |total, partial| async move {
                total.merge(partial)
            });

        let aggregator = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            aggregator = fetches => aggregator,
        };

        if aggregator.chunks_parsed() == 0 {
            tracing::warn!(
                subject_id,
                chunks_failed = aggregator.chunks_failed(),
                "No chunk returned usable data, nothing cached"
            );
            return Ok(None);
        }

        tracing::debug!(
            subject_id,
            chunks_parsed = aggregator.chunks_parsed(),
            chunks_failed = aggregator.chunks_failed(),
            "Aggregated remote metrics"
        );
        Ok(Some(aggregator.finish(subject_id)))
    }

    // ============================================
    // Writes
    // ============================================

    async fn write_caches(&self, set: &MetricSet) {
        for value in set.iter() {
            let key = CacheKey::new(value.subject_id, value.metric);
            if let Err(e) = self.tiers.durable.set(key, value.value).await {
                tracing::warn!(%key, error = %e, "Durable cache write failed");
            }
            if let Err(e) = self
                .tiers
                .short_lived
                .set(key, value.value, self.settings.short_ttl)
                .await
            {
                tracing::warn!(%key, error = %e, "Short-lived cache write failed");
            }
        }
    }

    async fn project(&self, set: &MetricSet) {
        for value in set.iter() {
            let key = CacheKey::new(value.subject_id, value.metric);
            if let Err(e) = self.tiers.projection.record(key, value.value).await {
                tracing::warn!(%key, error = %e, "Sort projection write failed");
            }
        }
    }
}
