//! Tagged point-to-point transport

use super::{Rank, Tag};
use async_trait::async_trait;
use thiserror::Error;

/// Channel failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rank {0} is unreachable")]
    Unreachable(Rank),

    #[error("rank {rank} closed its channel with no {tag} message pending")]
    PeerClosed { rank: Rank, tag: Tag },

    #[error("receive buffer too small: message is {needed} bytes, buffer holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("rank {rank} out of range for {worker_count} workers")]
    InvalidRank { rank: Rank, worker_count: usize },

    #[error("channel to rank {rank} failed: {reason}")]
    Channel { rank: Rank, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-to-point message passing between ranks
///
/// Messages between one pair of ranks with the same tag are delivered in send
/// order. `probe` and `receive` wait with no timeout; a peer whose channel
/// closes fails pending waits with [`TransportError::PeerClosed`], a live but
/// silent peer blocks them forever.
#[async_trait]
pub trait Transport: Send + Sync {
    /// This endpoint's rank
    fn rank(&self) -> Rank;

    /// Number of ranks in the job
    fn worker_count(&self) -> usize;

    /// Hand `payload` off for delivery to `destination`
    async fn send(&self, payload: &[u8], destination: Rank, tag: Tag) -> Result<(), TransportError>;

    /// Wait for a message from `source` with `tag`; return its length without consuming it
    async fn probe(&self, source: Rank, tag: Tag) -> Result<usize, TransportError>;

    /// Wait for a message from `source` with `tag` and copy it into `buffer`
    ///
    /// Returns the message length. A buffer shorter than the message fails
    /// with [`TransportError::BufferTooSmall`] and leaves the message pending.
    async fn receive(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<usize, TransportError>;

    /// Probe, then receive into an exactly sized buffer
    async fn receive_sized(&self, source: Rank, tag: Tag) -> Result<Vec<u8>, TransportError> {
        let len = self.probe(source, tag).await?;
        let mut buffer = vec![0u8; len];
        let received = self.receive(&mut buffer, source, tag).await?;
        buffer.truncate(received);
        Ok(buffer)
    }
}

/// Fail with [`TransportError::InvalidRank`] unless `rank < worker_count`
pub(crate) fn check_rank(rank: Rank, worker_count: usize) -> Result<(), TransportError> {
    if rank < worker_count {
        Ok(())
    } else {
        Err(TransportError::InvalidRank { rank, worker_count })
    }
}
