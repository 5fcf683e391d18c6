//! Job runner
//!
//! Glue between configuration, the local phase and the transport. One call
//! of [`run_rank`] is one rank's whole lifetime: count the owned slice, then
//! either merge everyone's results (rank 0) or ship this rank's results to
//! rank 0.

use crate::config::Config;
use crate::distributed::{Coordinator, LocalTransport, Rank, TcpTransport, Transport, COORDINATOR_RANK};
use crate::output::FinalReport;
use crate::partition::Partition;
use crate::source::LineSource;
use crate::worker::{aggregate_records, send_contribution, LocalAggregate};
use crate::Result;
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Count the records `partition` owns
///
/// File reading runs on the blocking pool.
pub async fn local_phase(config: &Config, partition: Partition) -> Result<LocalAggregate> {
    let path = config
        .source
        .path
        .clone()
        .context("Input path is required")?;
    let skip_header = config.source.skip_header;
    let format = config.source.record_format;
    let search_term = config.job.search_term.clone();

    let start = Instant::now();
    let (local, stats) = tokio::task::spawn_blocking(move || -> Result<_> {
        let source = LineSource::open(&path, skip_header)?;
        aggregate_records(source, partition, &search_term, format)
            .with_context(|| format!("Failed to read input: {}", path.display()))
    })
    .await
    .context("Local phase task failed")??;

    info!(
        rank = partition.rank(),
        records_seen = stats.records_seen,
        records_owned = stats.records_owned,
        records_skipped = stats.records_skipped,
        matches = local.matches,
        mentions = local.mentions.len(),
        topics = local.topics.len(),
        "Local phase complete in {:.3}s",
        start.elapsed().as_secs_f64()
    );
    Ok(local)
}

/// Run one rank to completion over `transport`
///
/// Returns the final report on rank 0 and `None` on every other rank.
pub async fn run_rank<T: Transport + ?Sized>(config: &Config, transport: &T) -> Result<Option<FinalReport>> {
    let start = Instant::now();
    let rank = transport.rank();
    let worker_count = transport.worker_count();

    if worker_count != config.job.worker_count {
        anyhow::bail!(
            "Transport has {} ranks but worker_count is {}",
            worker_count,
            config.job.worker_count
        );
    }
    let partition = Partition::new(rank, worker_count)?;

    if rank != COORDINATOR_RANK {
        let local = local_phase(config, partition).await?;
        send_contribution(transport, &local)
            .await
            .with_context(|| format!("Rank {} failed to send its contribution", rank))?;
        info!(rank, "Contribution delivered");
        return Ok(None);
    }

    let mut coordinator = Coordinator::new(transport, config.job.fan_in)?;
    coordinator.begin_local()?;
    let local = local_phase(config, partition).await?;
    coordinator.accept_local(local)?;
    coordinator.collect().await.context("Coordinator fan-in failed")?;

    let ranked = coordinator.finish(config.job.top_n)?;
    Ok(Some(FinalReport::new(
        &config.job.search_term,
        config.job.top_n,
        ranked,
        start.elapsed(),
    )))
}

/// Run every rank in this process over the in-process transport
///
/// Any rank failing fails the run. When several fail, a worker's error is
/// reported ahead of the coordinator's, which is usually its consequence.
pub async fn run_local_cluster(config: Arc<Config>) -> Result<FinalReport> {
    let worker_count = config.job.worker_count;
    info!("Running {} ranks in-process", worker_count);

    let handles: Vec<_> = LocalTransport::cluster(worker_count)
        .into_iter()
        .map(|transport| {
            let config = config.clone();
            tokio::spawn(async move { run_rank(&config, &transport).await })
        })
        .collect();

    let mut report = None;
    let mut failures: Vec<(Rank, anyhow::Error)> = Vec::new();
    for (rank, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(anyhow::Error::new(e).context("Rank task panicked")),
        };

        match outcome {
            Ok(Some(r)) => report = Some(r),
            Ok(None) => {}
            Err(e) => {
                error!(rank, "Rank failed: {:#}", e);
                failures.push((rank, e));
            }
        }
    }

    if !failures.is_empty() {
        let index = failures
            .iter()
            .position(|(rank, _)| *rank != COORDINATOR_RANK)
            .unwrap_or(0);
        let (rank, e) = failures.swap_remove(index);
        return Err(e.context(format!("Rank {} failed", rank)));
    }

    report.context("Coordinator produced no report")
}

/// Rank 0 over TCP: wait for every worker, then run
pub async fn run_tcp_coordinator(config: &Config) -> Result<FinalReport> {
    let addr = config
        .network
        .coordinator_addr
        .as_deref()
        .context("coordinator_addr is required in coordinator mode")?;

    let transport = TcpTransport::listen(addr, config.job.worker_count).await?;
    info!("All {} workers connected", config.job.worker_count - 1);

    run_rank(config, &transport)
        .await?
        .context("Coordinator produced no report")
}

/// A worker rank over TCP: connect, then run
pub async fn run_tcp_worker(config: &Config, rank: Rank) -> Result<()> {
    let addr = config
        .network
        .coordinator_addr
        .as_deref()
        .context("coordinator_addr is required in worker mode")?;

    let transport = TcpTransport::connect(
        addr,
        rank,
        config.job.worker_count,
        config.network.connect_retries,
        config.network.connect_retry_delay(),
    )
    .await?;

    run_rank(config, &transport).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::RankedEntry;
    use std::io::Write;
    use std::path::Path;

    fn write_input(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn config(path: &Path, workers: usize) -> Config {
        let mut config = Config::default();
        config.job.search_term = "kanye".into();
        config.job.worker_count = workers;
        config.source.path = Some(path.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_local_cluster_report() {
        let input = write_input(&["#a #a hello", "@b kanye", "#a @b", "kanye kanye"]);
        let report = run_local_cluster(Arc::new(config(input.path(), 2))).await.unwrap();

        assert_eq!(report.search_term, "kanye");
        assert_eq!(report.total_matches, 3);
        assert_eq!(report.worker_count, 2);
        assert_eq!(report.top_mentions, vec![RankedEntry::new("@b", 2)]);
        assert_eq!(report.top_topics, vec![RankedEntry::new("#a", 3)]);
    }

    #[tokio::test]
    async fn test_more_workers_than_records() {
        let input = write_input(&["#only"]);
        let report = run_local_cluster(Arc::new(config(input.path(), 4))).await.unwrap();

        assert_eq!(report.worker_count, 4);
        assert_eq!(report.top_topics, vec![RankedEntry::new("#only", 1)]);
    }

    #[tokio::test]
    async fn test_missing_input_fails_run() {
        let config = config(Path::new("/nonexistent/tweets.csv"), 3);
        assert!(run_local_cluster(Arc::new(config)).await.is_err());
    }

    #[tokio::test]
    async fn test_worker_count_mismatch() {
        let input = write_input(&["x"]);
        let cluster = LocalTransport::cluster(2);
        let err = run_rank(&config(input.path(), 3), &cluster[0]).await.unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }
}
