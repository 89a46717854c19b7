//! Database layer for postmetrics
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Tier trait implementations over the single [`Database`] handle

mod adapters;
pub mod repo;
pub mod schema;

pub use repo::{Database, RankedSubject};
