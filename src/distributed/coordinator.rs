//! Coordinator fan-in
//!
//! Rank 0 merges its own local aggregate with one contribution from every
//! other rank. A contribution is three messages (scalar, mentions map, topics
//! map) and only counts once all three arrived and decoded.
//!
//! # States
//!
//! ```text
//! Init -> LocalAggregate -> AwaitScalars <-> AwaitMaps -> Rank -> Done
//! ```
//!
//! In ordered fan-in the coordinator alternates between `AwaitScalars` and
//! `AwaitMaps` once per rank, in rank order, so a slow rank delays every rank
//! after it. Concurrent fan-in first gathers every scalar, then every map
//! pair, merging each rank as soon as its maps are in.

use super::{Rank, Tag, Transport, COORDINATOR_RANK};
use crate::config::FanInMode;
use crate::counts::{self, CountMap, RankedEntry};
use crate::error::AggregationError;
use crate::worker::LocalAggregate;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use tracing::{debug, info};

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Init,
    LocalAggregate,
    AwaitScalars,
    AwaitMaps,
    Rank,
    Done,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::LocalAggregate => "LOCAL_AGGREGATE",
            Self::AwaitScalars => "AWAIT_SCALARS",
            Self::AwaitMaps => "AWAIT_MAPS",
            Self::Rank => "RANK",
            Self::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

/// Merged result of every rank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResult {
    pub total_matches: u64,
    pub mentions: CountMap,
    pub topics: CountMap,
    /// Ranks merged so far, the coordinator included
    pub contributors: usize,
}

/// Final ranking produced by [`Coordinator::finish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedResult {
    pub total_matches: u64,
    pub top_mentions: Vec<RankedEntry>,
    pub top_topics: Vec<RankedEntry>,
    pub contributors: usize,
}

/// Rank 0's fan-in over a transport
pub struct Coordinator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    fan_in: FanInMode,
    state: CoordinatorState,
    result: AggregationResult,
    contributed: Vec<bool>,
}

impl<'a, T: Transport + ?Sized> Coordinator<'a, T> {
    /// Fails unless `transport` is rank 0's endpoint
    pub fn new(transport: &'a T, fan_in: FanInMode) -> Result<Self, AggregationError> {
        if transport.rank() != COORDINATOR_RANK {
            return Err(AggregationError::UnknownRank {
                rank: transport.rank(),
                worker_count: transport.worker_count(),
            });
        }

        Ok(Self {
            transport,
            fan_in,
            state: CoordinatorState::Init,
            result: AggregationResult::default(),
            contributed: vec![false; transport.worker_count()],
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Running totals (complete only after [`collect`](Self::collect))
    pub fn result(&self) -> &AggregationResult {
        &self.result
    }

    fn expect_state(&self, expected: CoordinatorState) -> Result<(), AggregationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AggregationError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn transition(&mut self, next: CoordinatorState) {
        debug!("Coordinator {} -> {}", self.state, next);
        self.state = next;
    }

    /// Enter the local phase
    pub fn begin_local(&mut self) -> Result<(), AggregationError> {
        self.expect_state(CoordinatorState::Init)?;
        self.transition(CoordinatorState::LocalAggregate);
        Ok(())
    }

    /// Merge the coordinator's own local aggregate
    pub fn accept_local(&mut self, local: LocalAggregate) -> Result<(), AggregationError> {
        self.expect_state(CoordinatorState::LocalAggregate)?;
        self.absorb(COORDINATOR_RANK, local)?;
        self.transition(CoordinatorState::AwaitScalars);
        Ok(())
    }

    /// Merge `aggregate` as the contribution of `rank`
    ///
    /// Every rank contributes exactly once.
    fn absorb(&mut self, rank: Rank, aggregate: LocalAggregate) -> Result<(), AggregationError> {
        let worker_count = self.contributed.len();
        let slot = self
            .contributed
            .get_mut(rank)
            .ok_or(AggregationError::UnknownRank { rank, worker_count })?;
        if *slot {
            return Err(AggregationError::DuplicateContribution { rank });
        }
        *slot = true;

        self.result.total_matches += aggregate.matches;
        self.result.mentions.merge_owned(aggregate.mentions);
        self.result.topics.merge_owned(aggregate.topics);
        self.result.contributors += 1;

        debug!(
            rank,
            matches = aggregate.matches,
            contributors = self.result.contributors,
            "Merged contribution"
        );
        Ok(())
    }

    /// Receive and merge every other rank's contribution
    ///
    /// Any transport or decode failure aborts the merge; nothing partial is
    /// reported.
    pub async fn collect(&mut self) -> Result<(), AggregationError> {
        self.expect_state(CoordinatorState::AwaitScalars)?;

        let workers = self.transport.worker_count();
        info!("Collecting contributions from {} workers ({} fan-in)", workers - 1, self.fan_in);

        match self.fan_in {
            FanInMode::Ordered => self.collect_ordered().await?,
            FanInMode::Concurrent => self.collect_concurrent().await?,
        }

        self.transition(CoordinatorState::Rank);
        Ok(())
    }

    async fn collect_ordered(&mut self) -> Result<(), AggregationError> {
        let transport = self.transport;

        for rank in 1..transport.worker_count() {
            self.transition(CoordinatorState::AwaitScalars);
            let matches = receive_scalar(transport, rank).await?;

            self.transition(CoordinatorState::AwaitMaps);
            let mentions = receive_map(transport, rank, Tag::Mentions).await?;
            let topics = receive_map(transport, rank, Tag::Topics).await?;

            self.absorb(
                rank,
                LocalAggregate {
                    matches,
                    mentions,
                    topics,
                },
            )?;
        }

        Ok(())
    }

    async fn collect_concurrent(&mut self) -> Result<(), AggregationError> {
        let transport = self.transport;
        let workers = transport.worker_count();

        let mut scalars = vec![0u64; workers];
        let mut pending: FuturesUnordered<_> = (1..workers)
            .map(|rank| async move { (rank, receive_scalar(transport, rank).await) })
            .collect();
        while let Some((rank, matches)) = pending.next().await {
            scalars[rank] = matches?;
        }

        self.transition(CoordinatorState::AwaitMaps);

        let mut pending: FuturesUnordered<_> = (1..workers)
            .map(|rank| async move {
                let maps = async {
                    let mentions = receive_map(transport, rank, Tag::Mentions).await?;
                    let topics = receive_map(transport, rank, Tag::Topics).await?;
                    Ok::<_, AggregationError>((mentions, topics))
                };
                (rank, maps.await)
            })
            .collect();
        while let Some((rank, maps)) = pending.next().await {
            let (mentions, topics) = maps?;
            self.absorb(
                rank,
                LocalAggregate {
                    matches: scalars[rank],
                    mentions,
                    topics,
                },
            )?;
        }

        Ok(())
    }

    /// Rank the merged maps
    ///
    /// Fails with `Incomplete` unless every rank contributed.
    pub fn finish(mut self, top_n: usize) -> Result<RankedResult, AggregationError> {
        self.expect_state(CoordinatorState::Rank)?;

        let expected = self.contributed.len();
        if self.result.contributors != expected {
            return Err(AggregationError::Incomplete {
                received: self.result.contributors,
                expected,
            });
        }

        let ranked = RankedResult {
            total_matches: self.result.total_matches,
            top_mentions: counts::top(&self.result.mentions, top_n),
            top_topics: counts::top(&self.result.topics, top_n),
            contributors: self.result.contributors,
        };
        self.transition(CoordinatorState::Done);

        info!(
            "Merged {} ranks: {} matches, {} distinct mentions, {} distinct topics",
            ranked.contributors,
            ranked.total_matches,
            self.result.mentions.len(),
            self.result.topics.len()
        );
        Ok(ranked)
    }
}

/// Receive the fixed-width scalar from `rank`
async fn receive_scalar<T: Transport + ?Sized>(transport: &T, rank: Rank) -> Result<u64, AggregationError> {
    let mut buf = [0u8; counts::codec::SCALAR_LEN];
    let len = transport.receive(&mut buf, rank, Tag::Scalar).await?;

    counts::decode_scalar(&buf[..len]).map_err(|source| AggregationError::Decode {
        rank,
        tag: Tag::Scalar,
        source,
    })
}

/// Probe for the size of `rank`'s map under `tag`, then receive and decode it
async fn receive_map<T: Transport + ?Sized>(
    transport: &T,
    rank: Rank,
    tag: Tag,
) -> Result<CountMap, AggregationError> {
    let payload = transport.receive_sized(rank, tag).await?;

    counts::decode(&payload).map_err(|source| AggregationError::Decode { rank, tag, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::{LocalTransport, TransportError};
    use crate::worker::send_contribution;

    fn aggregate(matches: u64, mentions: &[(&str, u64)], topics: &[(&str, u64)]) -> LocalAggregate {
        LocalAggregate {
            matches,
            mentions: mentions.iter().copied().collect(),
            topics: topics.iter().copied().collect(),
        }
    }

    async fn run_fan_in(fan_in: FanInMode) -> RankedResult {
        let mut cluster = LocalTransport::cluster(3);
        let rank2 = cluster.pop().unwrap();
        let rank1 = cluster.pop().unwrap();
        let rank0 = cluster.pop().unwrap();

        // Rank 2 sends before rank 1; ordered fan-in must still finish
        send_contribution(&rank2, &aggregate(2, &[("@b", 1)], &[("#x", 5)])).await.unwrap();
        send_contribution(&rank1, &aggregate(1, &[("@a", 3)], &[])).await.unwrap();

        let mut coordinator = Coordinator::new(&rank0, fan_in).unwrap();
        coordinator.begin_local().unwrap();
        coordinator
            .accept_local(aggregate(4, &[("@b", 2)], &[("#x", 1), ("#y", 6)]))
            .unwrap();
        coordinator.collect().await.unwrap();
        coordinator.finish(10).unwrap()
    }

    #[tokio::test]
    async fn test_ordered_fan_in() {
        let ranked = run_fan_in(FanInMode::Ordered).await;

        assert_eq!(ranked.total_matches, 7);
        assert_eq!(ranked.contributors, 3);
        assert_eq!(
            ranked.top_mentions,
            vec![RankedEntry::new("@a", 3), RankedEntry::new("@b", 3)]
        );
        assert_eq!(
            ranked.top_topics,
            vec![RankedEntry::new("#x", 6), RankedEntry::new("#y", 6)]
        );
    }

    #[tokio::test]
    async fn test_concurrent_matches_ordered() {
        assert_eq!(
            run_fan_in(FanInMode::Concurrent).await,
            run_fan_in(FanInMode::Ordered).await
        );
    }

    #[tokio::test]
    async fn test_single_worker_needs_no_messages() {
        let cluster = LocalTransport::cluster(1);
        let mut coordinator = Coordinator::new(&cluster[0], FanInMode::Ordered).unwrap();
        coordinator.begin_local().unwrap();
        coordinator.accept_local(aggregate(1, &[], &[("#t", 1)])).unwrap();
        coordinator.collect().await.unwrap();

        let ranked = coordinator.finish(10).unwrap();
        assert_eq!(ranked.total_matches, 1);
        assert_eq!(ranked.top_topics, vec![RankedEntry::new("#t", 1)]);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let cluster = LocalTransport::cluster(1);
        let mut coordinator = Coordinator::new(&cluster[0], FanInMode::Ordered).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Init);

        // Merging before the local phase started is rejected
        let err = coordinator.accept_local(LocalAggregate::default()).unwrap_err();
        assert!(matches!(
            err,
            AggregationError::InvalidState {
                expected: CoordinatorState::LocalAggregate,
                actual: CoordinatorState::Init,
            }
        ));

        coordinator.begin_local().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::LocalAggregate);
        coordinator.accept_local(LocalAggregate::default()).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::AwaitScalars);
        coordinator.collect().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Rank);
    }

    #[tokio::test]
    async fn test_finish_before_collect_is_rejected() {
        let cluster = LocalTransport::cluster(2);
        let mut coordinator = Coordinator::new(&cluster[0], FanInMode::Ordered).unwrap();
        coordinator.begin_local().unwrap();
        coordinator.accept_local(LocalAggregate::default()).unwrap();

        assert!(matches!(
            coordinator.finish(10),
            Err(AggregationError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_contribution() {
        let cluster = LocalTransport::cluster(2);
        let mut coordinator = Coordinator::new(&cluster[0], FanInMode::Ordered).unwrap();

        coordinator.absorb(1, LocalAggregate::default()).unwrap();
        assert!(matches!(
            coordinator.absorb(1, LocalAggregate::default()),
            Err(AggregationError::DuplicateContribution { rank: 1 })
        ));
        assert!(matches!(
            coordinator.absorb(7, LocalAggregate::default()),
            Err(AggregationError::UnknownRank { rank: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_incomplete_result_is_not_reported() {
        let cluster = LocalTransport::cluster(3);
        let mut coordinator = Coordinator::new(&cluster[0], FanInMode::Ordered).unwrap();
        coordinator.begin_local().unwrap();
        coordinator.accept_local(LocalAggregate::default()).unwrap();
        coordinator.absorb(1, LocalAggregate::default()).unwrap();
        coordinator.transition(CoordinatorState::Rank);

        assert!(matches!(
            coordinator.finish(10),
            Err(AggregationError::Incomplete { received: 2, expected: 3 })
        ));
    }

    #[tokio::test]
    async fn test_closed_worker_fails_collect() {
        let mut cluster = LocalTransport::cluster(2);
        let worker = cluster.pop().unwrap();
        let rank0 = cluster.pop().unwrap();

        // Scalar only, then the worker goes away
        worker
            .send(&counts::encode_scalar(1), COORDINATOR_RANK, Tag::Scalar)
            .await
            .unwrap();
        drop(worker);

        for fan_in in [FanInMode::Ordered, FanInMode::Concurrent] {
            let mut coordinator = Coordinator::new(&rank0, fan_in).unwrap();
            coordinator.begin_local().unwrap();
            coordinator.accept_local(LocalAggregate::default()).unwrap();

            let err = coordinator.collect().await.unwrap_err();
            assert!(matches!(
                err,
                AggregationError::Transport(TransportError::PeerClosed { rank: 1, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_undecodable_map() {
        let mut cluster = LocalTransport::cluster(2);
        let worker = cluster.pop().unwrap();
        let rank0 = cluster.pop().unwrap();

        worker.send(&counts::encode_scalar(1), 0, Tag::Scalar).await.unwrap();
        worker.send(&[9, 9, 9], 0, Tag::Mentions).await.unwrap();

        let mut coordinator = Coordinator::new(&rank0, FanInMode::Ordered).unwrap();
        coordinator.begin_local().unwrap();
        coordinator.accept_local(LocalAggregate::default()).unwrap();

        let err = coordinator.collect().await.unwrap_err();
        assert!(matches!(
            err,
            AggregationError::Decode { rank: 1, tag: Tag::Mentions, .. }
        ));
    }

    #[test]
    fn test_non_coordinator_rank_rejected() {
        let cluster = LocalTransport::cluster(2);
        assert!(Coordinator::new(&cluster[1], FanInMode::Ordered).is_err());
    }
}
