//! # postmetrics-core
//!
//! Core library for postmetrics - trailing 30-day views and sessions per post.
//!
//! This library provides:
//! - The tiered [`MetricsResolver`] (primary store, durable cache,
//!   short-lived cache, remote analytics API)
//! - Date range chunking and response aggregation for the remote API
//! - SQLite-backed implementations of every local tier
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use postmetrics_core::{Config, Database, MetricsResolver};
//!
//! # async fn run() -> postmetrics_core::Result<()> {
//! let config = Config::load()?;
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let resolver = MetricsResolver::from_config(&config, Arc::new(db))?;
//! let metrics = resolver.resolve(42).await;
//! println!("{:?}", metrics.values);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use resolver::{MetricsResolver, Resolution, ResolverSettings, Tiers};
pub use types::*;

/// Token used to cancel in-flight resolutions.
pub use tokio_util::sync::CancellationToken;

// Public modules
pub mod cache;
pub mod chunker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod remote;
pub mod resolver;
pub mod tiers;
pub mod types;
