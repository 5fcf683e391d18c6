//! Report output
//!
//! - `text`: human-readable report on stdout
//! - `json`: machine-readable report file

pub mod json;
pub mod text;

use crate::counts::RankedEntry;
use crate::distributed::coordinator::RankedResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Everything a successful run reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub search_term: String,
    pub total_matches: u64,
    pub top_n: usize,
    pub top_mentions: Vec<RankedEntry>,
    pub top_topics: Vec<RankedEntry>,
    pub worker_count: usize,
    pub elapsed_secs: f64,
    pub generated_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn new(search_term: &str, top_n: usize, ranked: RankedResult, elapsed: Duration) -> Self {
        Self {
            search_term: search_term.to_string(),
            total_matches: ranked.total_matches,
            top_n,
            top_mentions: ranked.top_mentions,
            top_topics: ranked.top_topics,
            worker_count: ranked.contributors,
            elapsed_secs: elapsed.as_secs_f64(),
            generated_at: Utc::now(),
        }
    }
}
