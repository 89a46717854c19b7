//! Remote analytics API access
//!
//! The remote API is the slowest tier and the only one that can answer for a
//! subject the local stores know nothing about. Its query span is capped, so
//! a window is fetched as independent chunks (see [`crate::chunker`]) whose
//! responses are summed by [`ResponseAggregator`].
//!
//! ## Flow
//!
//! ```text
//! MetricWindow ──split──▶ [Chunk; n] ──fetch_chunk (concurrent)──▶ [RawResponse]
//!                                                                      │
//!                                            ResponseAggregator::add ◀─┘
//!                                                      │
//!                                                      ▼
//!                                                  MetricSet
//! ```

mod aggregate;
mod client;
mod query;

pub use aggregate::{parse_response, ResponseAggregator};
pub use client::RemoteAnalyticsClient;
pub use query::{TrafficQuery, PAGE_SIZE};

use crate::types::Chunk;

/// Unparsed body of one successful chunk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Chunk the body answers for
    pub chunk: Chunk,
    /// Response body as returned by the API
    pub body: String,
}

impl RawResponse {
    pub fn new(chunk: Chunk, body: impl Into<String>) -> Self {
        Self {
            chunk,
            body: body.into(),
        }
    }
}
