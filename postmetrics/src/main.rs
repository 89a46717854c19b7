//! postmetrics - trailing 30-day views and sessions per post
//!
//! Resolves metrics through the tier cascade (primary store, durable cache,
//! short-lived cache, remote analytics API) and prints them.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/postmetrics/data.db (~/.local/share/postmetrics/data.db)
//! - Logs: $XDG_STATE_HOME/postmetrics/postmetrics.log (~/.local/state/postmetrics/postmetrics.log)
//! - Config: $XDG_CONFIG_HOME/postmetrics/config.toml (~/.config/postmetrics/config.toml)

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use postmetrics_core::{
    Config, Database, Metric, MetricSet, MetricsResolver, Resolution, SubjectId,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "postmetrics")]
#[command(about = "Resolve trailing 30-day views and sessions per post")]
#[command(version)]
struct Args {
    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve metrics for one or more subjects (Ctrl-C cancels)
    Resolve {
        /// Subject ids, resolved in the order given
        #[arg(required = true)]
        ids: Vec<SubjectId>,
    },
    /// Re-query the primary store and overwrite the sort projection
    Refresh {
        id: SubjectId,
    },
    /// List subjects ordered by their last resolved value
    Rank {
        /// Metric to sort by (views or sessions)
        #[arg(long, default_value = "views")]
        metric: Metric,

        /// Maximum number of subjects to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Record the page path the remote API tracks a subject under
    Path {
        id: SubjectId,
        page_path: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// One printed result row.
///
/// A metric no tier could resolve is shown as 0; only a cancelled row omits
/// its values.
#[derive(Serialize)]
struct MetricsRow {
    subject_id: SubjectId,
    #[serde(flatten)]
    values: Option<RowValues>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    cancelled: bool,
}

#[derive(Serialize)]
struct RowValues {
    views: u64,
    sessions: u64,
}

impl MetricsRow {
    fn resolved(set: &MetricSet) -> Self {
        Self {
            subject_id: set.subject_id,
            values: Some(RowValues {
                views: set.get(Metric::Views).unwrap_or(0),
                sessions: set.get(Metric::Sessions).unwrap_or(0),
            }),
            cancelled: false,
        }
    }

    fn from_resolution(subject_id: SubjectId, resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Resolved(set) => Self::resolved(set),
            Resolution::Cancelled => Self {
                subject_id,
                values: None,
                cancelled: true,
            },
        }
    }

    fn render_text(&self) -> String {
        match &self.values {
            Some(values) if !self.cancelled => format!(
                "{:>8}  views={:<8} sessions={}",
                self.subject_id, values.views, values.sessions
            ),
            _ => format!("{:>8}  cancelled", self.subject_id),
        }
    }
}

#[derive(Serialize)]
struct RankedRow {
    subject_id: SubjectId,
    metric: Metric,
    value: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard = postmetrics_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("postmetrics starting");

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    let db = Arc::new(db);

    let build_resolver = || {
        MetricsResolver::from_config(&config, db.clone()).context("failed to create resolver")
    };

    let result = match args.command {
        Command::Resolve { ids } => resolve(&build_resolver()?, &ids, args.format).await,
        Command::Refresh { id } => {
            let set = build_resolver()?.force_refresh(id).await;
            print_rows(&[MetricsRow::resolved(&set)], args.format)
        }
        Command::Rank { metric, limit } => rank(&build_resolver()?, metric, limit, args.format).await,
        Command::Path { id, page_path } => set_page_path(&db, id, &page_path),
    };

    tracing::info!("postmetrics shutting down");

    result
}

fn set_page_path(db: &Database, id: SubjectId, page_path: &str) -> Result<()> {
    if !page_path.starts_with('/') {
        bail!("page path must start with '/': {}", page_path);
    }
    db.upsert_page_path(id, page_path)
        .context("failed to store page path")?;
    println!("Subject {} tracked as {}", id, page_path);
    Ok(())
}

async fn resolve(resolver: &MetricsResolver, ids: &[SubjectId], format: OutputFormat) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let results = resolver.resolve_many(ids, &cancel).await;
    ctrl_c.abort();

    let rows: Vec<_> = results
        .iter()
        .map(|(id, resolution)| MetricsRow::from_resolution(*id, resolution))
        .collect();
    print_rows(&rows, format)?;

    if cancel.is_cancelled() {
        bail!("resolution cancelled");
    }
    Ok(())
}

async fn rank(
    resolver: &MetricsResolver,
    metric: Metric,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let ranked = resolver
        .ranked(metric, limit)
        .await
        .context("failed to read sort projection")?;
    let rows: Vec<_> = ranked
        .into_iter()
        .map(|(subject_id, value)| RankedRow {
            subject_id,
            metric,
            value,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No {} recorded yet", metric);
            }
            for (rank, row) in rows.iter().enumerate() {
                println!("{:>3}. {:>8}  {}={}", rank + 1, row.subject_id, metric, row.value);
            }
        }
    }
    Ok(())
}

fn print_rows(rows: &[MetricsRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            for row in rows {
                println!("{}", row.render_text());
            }
        }
    }
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Interrupt received, cancelling resolution");
            cancel.cancel();
        }
        Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
