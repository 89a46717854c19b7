//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//!
//! The `traffic_daily` table read by the primary store adapter is provisioned
//! by whatever collects traffic, never by these migrations. Its absence is
//! how the primary store reports itself unavailable.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Table the primary store adapter reads from.
pub const TRAFFIC_TABLE: &str = "traffic_daily";

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: cache tiers and sort projection
    r#"
    -- Durable side-store: no expiry
    CREATE TABLE IF NOT EXISTS metric_cache (
        subject_id       INTEGER NOT NULL,
        metric           TEXT NOT NULL,
        value            INTEGER NOT NULL,
        updated_at       DATETIME NOT NULL,

        PRIMARY KEY (subject_id, metric)
    );

    -- Short-lived cache: rows past expires_at (unix millis) read as absent
    CREATE TABLE IF NOT EXISTS metric_transients (
        subject_id       INTEGER NOT NULL,
        metric           TEXT NOT NULL,
        value            INTEGER NOT NULL,
        expires_at       INTEGER NOT NULL,

        PRIMARY KEY (subject_id, metric)
    );

    -- Denormalized latest value, for sorting listings only
    CREATE TABLE IF NOT EXISTS metric_projection (
        subject_id       INTEGER NOT NULL,
        metric           TEXT NOT NULL,
        value            INTEGER NOT NULL,
        updated_at       DATETIME NOT NULL,

        PRIMARY KEY (subject_id, metric)
    );

    CREATE INDEX IF NOT EXISTS idx_metric_projection_rank
        ON metric_projection(metric, value DESC);
    "#,
    // Version 2: subject page paths for the remote tier
    r#"
    CREATE TABLE IF NOT EXISTS subject_paths (
        subject_id       INTEGER PRIMARY KEY,
        page_path        TEXT NOT NULL,
        updated_at       DATETIME NOT NULL
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

/// Check whether a table exists
pub fn table_exists(conn: &Connection, table: &str) -> crate::error::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}
