//! Date range chunking
//!
//! The remote analytics API caps the span of a single query, so a window is
//! split into consecutive half-open chunks before fetching. Chunks tile the
//! input exactly: the first starts at the range start, each next chunk starts
//! where the previous one ended, and the last ends at the range end.

use chrono::{Duration, NaiveDate};

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Longest span, in days, the remote API accepts for one query.
pub const MAX_SPAN_DAYS: u32 = 9;

/// Split `[start_date, end_date)` into chunks of at most `max_span_days` days.
///
/// A range no longer than `max_span_days` (including an empty one) comes back
/// as a single chunk equal to the input. Skipping empty windows is the
/// caller's job.
pub fn split(start_date: NaiveDate, end_date: NaiveDate, max_span_days: u32) -> Result<Vec<Chunk>> {
    if start_date > end_date {
        return Err(Error::InvalidRange(format!(
            "start {} is after end {}",
            start_date, end_date
        )));
    }
    if max_span_days == 0 {
        return Err(Error::InvalidRange(
            "max_span_days must be at least 1".to_string(),
        ));
    }

    let span = Duration::days(i64::from(max_span_days));
    if end_date - start_date <= span {
        return Ok(vec![Chunk::new(start_date, end_date)]);
    }

    let mut chunks = Vec::new();
    let mut cursor = start_date;
    while cursor < end_date {
        let chunk_end = std::cmp::min(cursor + span, end_date);
        chunks.push(Chunk::new(cursor, chunk_end));
        cursor = chunk_end;
    }

    Ok(chunks)
}
