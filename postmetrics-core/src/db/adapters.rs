//! Tier trait implementations backed by [`Database`]
//!
//! Each call takes the connection lock for one statement only, so tiers never
//! share a transaction. Statements run on tokio's blocking pool; a lock wait
//! or `busy_timeout` stall never holds up chunk fetches on the runtime.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::tiers::{DurableCache, ExpiringCache, PagePaths, PrimaryStore, SortProjection};
use crate::types::{CacheKey, Metric, MetricSet, SubjectId};

use super::repo::Database;

impl Database {
    async fn with_blocking<T, F>(&self, func: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || func(&db))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }
}

#[async_trait]
impl PrimaryStore for Database {
    async fn tables_exist(&self) -> Result<bool> {
        self.with_blocking(|db| db.traffic_tables_exist()).await
    }

    async fn get_post_metrics(
        &self,
        subject_id: SubjectId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<MetricSet> {
        self.with_blocking(move |db| db.sum_traffic(subject_id, start_date, end_date))
            .await
    }
}

#[async_trait]
impl DurableCache for Database {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>> {
        self.with_blocking(move |db| db.get_cached_metric(key)).await
    }

    async fn set(&self, key: CacheKey, value: u64) -> Result<()> {
        self.with_blocking(move |db| db.set_cached_metric(key, value))
            .await
    }
}

#[async_trait]
impl ExpiringCache for Database {
    async fn get(&self, key: CacheKey) -> Result<Option<u64>> {
        self.with_blocking(move |db| db.get_transient_metric(key))
            .await
    }

    async fn set(&self, key: CacheKey, value: u64, ttl: Duration) -> Result<()> {
        self.with_blocking(move |db| db.set_transient_metric(key, value, ttl))
            .await
    }
}

#[async_trait]
impl SortProjection for Database {
    async fn record(&self, key: CacheKey, value: u64) -> Result<()> {
        self.with_blocking(move |db| db.set_projected_metric(key, value))
            .await
    }

    async fn ranked(&self, metric: Metric, limit: usize) -> Result<Vec<(SubjectId, u64)>> {
        self.with_blocking(move |db| {
            Ok(db
                .list_ranked_subjects(metric, limit)?
                .into_iter()
                .map(|row| (row.subject_id, row.value))
                .collect())
        })
        .await
    }
}

#[async_trait]
impl PagePaths for Database {
    async fn page_path(&self, subject_id: SubjectId) -> Result<Option<String>> {
        self.with_blocking(move |db| db.get_page_path(subject_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[tokio::test]
    async fn test_tiers_round_trip_through_blocking_pool() {
        let db = test_db();
        let key = CacheKey::new(3, Metric::Sessions);

        DurableCache::set(&db, key, 11).await.unwrap();
        ExpiringCache::set(&db, key, 12, Duration::from_secs(60))
            .await
            .unwrap();
        db.record(key, 13).await.unwrap();

        assert_eq!(DurableCache::get(&db, key).await.unwrap(), Some(11));
        assert_eq!(ExpiringCache::get(&db, key).await.unwrap(), Some(12));
        assert_eq!(db.ranked(Metric::Sessions, 5).await.unwrap(), vec![(3, 13)]);
        assert!(!db.tables_exist().await.unwrap());
        assert_eq!(db.page_path(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_wait_does_not_block_runtime() {
        let db = test_db();
        let key = CacheKey::new(1, Metric::Views);

        // Another thread holds the connection for a while
        let (locked_tx, locked_rx) = mpsc::channel();
        let holder = {
            let db = db.clone();
            std::thread::spawn(move || {
                let _conn = db.connection();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(300));
            })
        };
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let (value, timer_fired_at) = tokio::join!(DurableCache::get(&db, key), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        });

        assert_eq!(value.unwrap(), None);
        assert!(
            timer_fired_at < Duration::from_millis(200),
            "runtime stalled for {:?} behind the connection lock",
            timer_fired_at
        );
        holder.join().unwrap();
    }
}
