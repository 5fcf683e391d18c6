//! Aggregation errors
//!
//! Process boundaries (CLI, job runner, config loading) use `anyhow`; the
//! aggregation core reports this typed error so callers can tell a broken
//! channel from an incomplete merge.

use crate::counts::CodecError;
use crate::distributed::{CoordinatorState, Rank, Tag, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregationError {
    /// A worker could not serialize its own maps; nothing was sent
    #[error("failed to encode {tag} map")]
    Encode {
        tag: Tag,
        #[source]
        source: CodecError,
    },

    #[error("rank {rank} sent an undecodable {tag} payload")]
    Decode {
        rank: Rank,
        tag: Tag,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("rank {rank} contributed more than once")]
    DuplicateContribution { rank: Rank },

    #[error("rank {rank} is not a contributor in a {worker_count}-worker job")]
    UnknownRank { rank: Rank, worker_count: usize },

    #[error("aggregation incomplete: {received} of {expected} ranks contributed")]
    Incomplete { received: usize, expected: usize },

    #[error("coordinator is in state {actual}, expected {expected}")]
    InvalidState {
        expected: CoordinatorState,
        actual: CoordinatorState,
    },
}
