//! Record partitioning
//!
//! Every rank reads the same record stream and keeps only the records it owns.
//! Ownership is `index mod worker_count == rank`, so the ranks together cover
//! every record exactly once as long as they all see the records in the same
//! order.
//!
//! # Example
//!
//! ```
//! use tweetpulse::partition::Partition;
//!
//! let partition = Partition::new(1, 2)?;
//! assert!(!partition.owns(0));
//! assert!(partition.owns(1));
//! assert_eq!(partition.owner_of(5), 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::distributed::Rank;
use anyhow::Result;

/// Return true iff `rank` owns the record at `record_index`.
///
/// Must be identical on every rank. `worker_count` of zero owns nothing.
#[inline]
pub fn owns(record_index: u64, rank: Rank, worker_count: usize) -> bool {
    if worker_count == 0 {
        return false;
    }
    record_index % worker_count as u64 == rank as u64
}

/// Partition assignment for one rank
///
/// Validated on construction, so `owns` and `owner_of` cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    rank: Rank,
    worker_count: usize,
}

impl Partition {
    /// Create the partition for `rank` out of `worker_count` ranks
    pub fn new(rank: Rank, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        if rank >= worker_count {
            anyhow::bail!(
                "rank {} out of range for {} worker(s) (valid: 0-{})",
                rank,
                worker_count,
                worker_count - 1
            );
        }

        Ok(Self { rank, worker_count })
    }

    /// Single-rank partition owning every record
    pub fn whole() -> Self {
        Self {
            rank: 0,
            worker_count: 1,
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Does this rank own the record at `record_index`?
    #[inline]
    pub fn owns(&self, record_index: u64) -> bool {
        owns(record_index, self.rank, self.worker_count)
    }

    /// Rank that owns the record at `record_index`
    #[inline]
    pub fn owner_of(&self, record_index: u64) -> Rank {
        (record_index % self.worker_count as u64) as Rank
    }
}
