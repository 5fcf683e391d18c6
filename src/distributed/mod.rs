//! Distributed aggregation
//!
//! Every rank counts its own slice of the record stream; non-coordinator
//! ranks then ship their partial counters to rank 0, which merges them.
//!
//! # Architecture
//!
//! - **Transport**: tagged point-to-point channel with a size-reporting probe
//! - **Mailbox**: pending messages keyed by `(source, tag)`, shared by both
//!   transport implementations
//! - **Coordinator**: rank 0 fan-in state machine
//!
//! # Modules
//!
//! - `transport`: the `Transport` trait and its error type
//! - `mailbox`: per-process store of pending messages
//! - `local`: in-process cluster (standalone runs and tests)
//! - `protocol`: TCP envelope messages and framing
//! - `tcp`: TCP transport
//! - `coordinator`: merge of all contributions into the final result

pub mod coordinator;
pub mod local;
pub mod mailbox;
pub mod protocol;
pub mod tcp;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export key types
pub use coordinator::{AggregationResult, Coordinator, CoordinatorState};
pub use local::LocalTransport;
pub use mailbox::Mailbox;
pub use protocol::{Message, PROTOCOL_VERSION};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportError};

/// Worker identifier in `[0, worker_count)`
pub type Rank = usize;

/// Rank that merges everyone's results
pub const COORDINATOR_RANK: Rank = 0;

/// Message channel selector
///
/// A receive only matches messages sent with the same tag, so a worker's
/// messages may arrive in any order relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// Search term match count (fixed 8 bytes)
    Scalar,
    /// Encoded mentions map
    Mentions,
    /// Encoded topics map
    Topics,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Scalar => write!(f, "SCALAR"),
            Tag::Mentions => write!(f, "MENTIONS"),
            Tag::Topics => write!(f, "TOPICS"),
        }
    }
}
