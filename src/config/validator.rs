//! Configuration validation

use super::*;
use crate::config::cli::ExecutionMode;
use crate::distributed::{Rank, COORDINATOR_RANK};
use crate::source::tokenizer::is_token_char;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_job(&config.job)?;
    validate_source(&config.source)?;
    validate_network(&config.network)?;

    Ok(())
}

/// Validate job configuration
pub fn validate_job(job: &JobConfig) -> Result<()> {
    if job.worker_count == 0 {
        anyhow::bail!("worker_count must be at least 1");
    }

    if job.top_n == 0 {
        anyhow::bail!("top_n must be at least 1");
    }

    if job.search_term.is_empty() {
        anyhow::bail!("search_term is required");
    }

    // A term containing a separator can never equal a single token
    if let Some(c) = job.search_term.chars().find(|&c| !is_token_char(c)) {
        anyhow::bail!(
            "search_term '{}' contains '{}'; only ASCII letters, digits, '_', '#' and '@' can match a token",
            job.search_term,
            c
        );
    }

    Ok(())
}

/// Validate source configuration
pub fn validate_source(source: &SourceConfig) -> Result<()> {
    match source.path {
        None => anyhow::bail!("input path is required"),
        Some(ref path) if path.as_os_str().is_empty() => anyhow::bail!("input path is empty"),
        Some(_) => Ok(()),
    }
}

/// Validate network configuration
pub fn validate_network(network: &NetworkConfig) -> Result<()> {
    if let Some(ref addr) = network.coordinator_addr {
        if !addr.contains(':') {
            anyhow::bail!("coordinator_addr must be host:port, got '{}'", addr);
        }
    }

    Ok(())
}

/// Validate what depends on the process's role
pub fn validate_role(config: &Config, mode: ExecutionMode, rank: Option<Rank>) -> Result<()> {
    let worker_count = config.job.worker_count;

    match mode {
        ExecutionMode::Standalone => Ok(()),
        ExecutionMode::Coordinator => {
            if config.network.coordinator_addr.is_none() {
                anyhow::bail!("coordinator mode requires coordinator_addr");
            }
            Ok(())
        }
        ExecutionMode::Worker => {
            let rank = match rank {
                Some(rank) => rank,
                None => anyhow::bail!("worker mode requires a rank"),
            };
            if rank == COORDINATOR_RANK || rank >= worker_count {
                anyhow::bail!(
                    "worker rank must be between 1 and {}, got {}",
                    worker_count.saturating_sub(1),
                    rank
                );
            }
            if config.network.coordinator_addr.is_none() {
                anyhow::bail!("worker mode requires coordinator_addr");
            }
            Ok(())
        }
    }
}
