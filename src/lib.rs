//! tweetpulse - distributed term, mention and hashtag counter
//!
//! Counts how often a search term appears in a large record stream, and
//! ranks the most frequent `@mentions` and `#topics`, by splitting the stream
//! across a fixed set of ranks and merging their partial counts at rank 0.
//!
//! # Architecture
//!
//! - **Partitioning**: record `i` belongs to rank `i mod worker_count`
//! - **Local aggregation**: each rank counts only the records it owns
//! - **Wire codec**: versioned binary encoding of count maps
//! - **Transport**: tagged point-to-point messages, in-process or over TCP
//! - **Coordinator**: rank 0 merges every contribution, then ranks the result

pub mod config;
pub mod counts;
pub mod distributed;
pub mod error;
pub mod job;
pub mod output;
pub mod partition;
pub mod source;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use counts::CountMap;
pub use error::AggregationError;
pub use output::FinalReport;

/// Result type used throughout tweetpulse
pub type Result<T> = anyhow::Result<T>;
