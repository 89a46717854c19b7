//! Request payload for the traffic endpoint
//!
//! One query is issued per chunk. The payload travels URL-encoded in the
//! `data` query parameter of a GET request.

use serde::Serialize;

use crate::types::{Chunk, Metric};

/// Rows requested per query. A chunk of daily rows for one page path always
/// fits in one page, so only page 1 is ever requested.
pub const PAGE_SIZE: u32 = 1000;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Body of a traffic query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficQuery<'a> {
    filters: Filters<'a>,
    granularity: &'static str,
    metrics: Vec<&'static str>,
    dimensions: [&'static str; 2],
    order_by: OrderBy,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filters<'a> {
    date: DateFilter,
    property_id: InFilter<'a>,
    page_path: EqFilter<'a>,
}

/// Half-open date filter; `lt` is exclusive.
#[derive(Debug, Serialize)]
struct DateFilter {
    gte: String,
    lt: String,
}

#[derive(Debug, Serialize)]
struct InFilter<'a> {
    #[serde(rename = "in")]
    values: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct EqFilter<'a> {
    eq: &'a str,
}

#[derive(Debug, Serialize)]
struct OrderBy {
    date: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page_size: u32,
    page_number: u32,
}

impl<'a> TrafficQuery<'a> {
    /// Daily rows for one page path over one chunk, ordered by date.
    pub fn for_chunk(
        property_id: &'a str,
        page_path: &'a str,
        metrics: &[Metric],
        chunk: &Chunk,
    ) -> Self {
        Self {
            filters: Filters {
                date: DateFilter {
                    gte: chunk.start_date.format(DATE_FORMAT).to_string(),
                    lt: chunk.end_date.format(DATE_FORMAT).to_string(),
                },
                property_id: InFilter {
                    values: [property_id],
                },
                page_path: EqFilter { eq: page_path },
            },
            granularity: "daily",
            metrics: metrics.iter().map(Metric::as_str).collect(),
            dimensions: ["date", "pagePath"],
            order_by: OrderBy { date: "asc" },
            pagination: Pagination {
                page_size: PAGE_SIZE,
                page_number: 1,
            },
        }
    }

    /// URL-encoded JSON for the `data` query parameter.
    pub fn encode(&self) -> crate::error::Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(urlencoding::encode(&json).into_owned())
    }
}
