//! Database repository layer
//!
//! Provides query and upsert operations for the cache tiers, the sort
//! projection, subject page paths, and read access to the traffic table.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::schema::{self, TRAFFIC_TABLE};

/// A projection row for ranked listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedSubject {
    pub subject_id: SubjectId,
    pub value: u64,
}

/// Database handle over a single shared connection.
///
/// Clones share the connection, so a handle can be moved onto a blocking
/// thread.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Stored integers are signed; metric values never are.
fn to_sql_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_value(value: i64) -> u64 {
    value.max(0) as u64
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Subject page paths
    // ============================================

    /// Insert or update the page path of a subject
    pub fn upsert_page_path(&self, subject_id: SubjectId, page_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO subject_paths (subject_id, page_path, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(subject_id) DO UPDATE SET
                page_path = excluded.page_path,
                updated_at = excluded.updated_at
            "#,
            params![subject_id, page_path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Get the page path of a subject
    pub fn get_page_path(&self, subject_id: SubjectId) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let path = conn
            .query_row(
                "SELECT page_path FROM subject_paths WHERE subject_id = ?1",
                [subject_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path)
    }

    // ============================================
    // Durable cache
    // ============================================

    /// Get a durable cache value; durable entries never expire
    pub fn get_cached_metric(&self, key: CacheKey) -> Result<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM metric_cache WHERE subject_id = ?1 AND metric = ?2",
                params![key.subject_id, key.metric.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(from_sql_value))
    }

    /// Insert or overwrite a durable cache value
    pub fn set_cached_metric(&self, key: CacheKey, value: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO metric_cache (subject_id, metric, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(subject_id, metric) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![
                key.subject_id,
                key.metric.as_str(),
                to_sql_value(value),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ============================================
    // Short-lived cache
    // ============================================

    /// Get an unexpired transient value
    pub fn get_transient_metric(&self, key: CacheKey) -> Result<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let value: Option<i64> = conn
            .query_row(
                r#"
                SELECT value FROM metric_transients
                WHERE subject_id = ?1 AND metric = ?2 AND expires_at > ?3
                "#,
                params![
                    key.subject_id,
                    key.metric.as_str(),
                    Utc::now().timestamp_millis()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(from_sql_value))
    }

    /// Insert or overwrite a transient value expiring after `ttl`
    pub fn set_transient_metric(&self, key: CacheKey, value: u64, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO metric_transients (subject_id, metric, value, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(subject_id, metric) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
            params![
                key.subject_id,
                key.metric.as_str(),
                to_sql_value(value),
                expires_at
            ],
        )?;
        Ok(())
    }

    // ============================================
    // Sort projection
    // ============================================

    /// Record the latest resolved value of a metric
    pub fn set_projected_metric(&self, key: CacheKey, value: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO metric_projection (subject_id, metric, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(subject_id, metric) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![
                key.subject_id,
                key.metric.as_str(),
                to_sql_value(value),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the projected value of a metric
    pub fn get_projected_metric(&self, key: CacheKey) -> Result<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM metric_projection WHERE subject_id = ?1 AND metric = ?2",
                params![key.subject_id, key.metric.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(from_sql_value))
    }

    /// List subjects by projected metric, highest first.
    ///
    /// Ties are broken by subject id so listings page deterministically.
    pub fn list_ranked_subjects(&self, metric: Metric, limit: usize) -> Result<Vec<RankedSubject>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT subject_id, value FROM metric_projection
            WHERE metric = ?1
            ORDER BY value DESC, subject_id ASC
            LIMIT ?2
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![metric.as_str(), limit], |row| {
                Ok(RankedSubject {
                    subject_id: row.get(0)?,
                    value: from_sql_value(row.get(1)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ============================================
    // Primary store (traffic table)
    // ============================================

    /// Whether the traffic table has been provisioned
    pub fn traffic_tables_exist(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        schema::table_exists(&conn, TRAFFIC_TABLE)
    }

    /// Sum daily traffic for `[start_date, end_date)`.
    ///
    /// Days without rows count as zero traffic, so a provisioned table always
    /// yields both metrics.
    pub fn sum_traffic(
        &self,
        subject_id: SubjectId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<MetricSet> {
        let conn = self.conn.lock().unwrap();

        if !schema::table_exists(&conn, TRAFFIC_TABLE)? {
            return Err(Error::StoreUnavailable(format!(
                "table {} does not exist",
                TRAFFIC_TABLE
            )));
        }

        let (views, sessions): (i64, i64) = conn
            .query_row(
                r#"
                SELECT COALESCE(SUM(views), 0), COALESCE(SUM(sessions), 0)
                FROM traffic_daily
                WHERE subject_id = ?1 AND day >= ?2 AND day < ?3
                "#,
                params![subject_id, date_key(start_date), date_key(end_date)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::StoreQuery(e.to_string()))?;

        let mut set = MetricSet::empty(subject_id);
        set.insert(Metric::Views, from_sql_value(views));
        set.insert(Metric::Sessions, from_sql_value(sessions));
        Ok(set)
    }
}
