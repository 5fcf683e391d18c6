//! CLI argument parsing using clap

use super::{FanInMode, LogFormat};
use crate::source::RecordFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - every rank in this process
    Standalone,
    /// Coordinator mode - rank 0, waits for workers over TCP
    Coordinator,
    /// Worker mode - one non-zero rank, reports to the coordinator
    Worker,
}

/// tweetpulse - distributed term, mention and hashtag counter
#[derive(Parser, Debug)]
#[command(name = "tweetpulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: standalone, coordinator, or worker
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// This process's rank (worker mode only, 1..workers)
    #[arg(long)]
    pub rank: Option<usize>,

    /// Input file (every rank reads the same file)
    #[arg(value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// TOML configuration file; command-line values override it
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Job Options ===
    /// Search term to count (case-insensitive)
    #[arg(short = 's', long)]
    pub search_term: Option<String>,

    /// Total number of ranks, coordinator included
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Entries per ranking
    #[arg(short = 'n', long)]
    pub top: Option<usize>,

    /// Coordinator receive order
    #[arg(long, value_enum)]
    pub fan_in: Option<FanInMode>,

    // === Source Options ===
    /// Record format
    #[arg(long, value_enum)]
    pub format: Option<RecordFormat>,

    /// Skip the first input line
    #[arg(long)]
    pub skip_header: bool,

    // === Network Options ===
    /// Coordinator address (host:port)
    #[arg(long, env = "TWEETPULSE_COORDINATOR_ADDR")]
    pub coordinator_addr: Option<String>,

    /// Extra connect attempts while the coordinator is starting
    #[arg(long)]
    pub connect_retries: Option<u32>,

    /// Delay between connect attempts in milliseconds
    #[arg(long)]
    pub connect_retry_delay_ms: Option<u64>,

    // === Output Options ===
    /// Write the report as JSON to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Don't print the text report
    #[arg(short = 'q', long)]
    pub quiet: bool,

    // === Runtime Options ===
    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Only checks that need the command line itself; the merged
    /// configuration is checked by `validator`.
    pub fn validate(&self) -> anyhow::Result<()> {
        match (self.mode, self.rank) {
            (ExecutionMode::Worker, None) => {
                anyhow::bail!("--rank is required in worker mode");
            }
            (ExecutionMode::Worker, Some(0)) => {
                anyhow::bail!("rank 0 is the coordinator; use --mode coordinator");
            }
            (ExecutionMode::Standalone | ExecutionMode::Coordinator, Some(_)) => {
                anyhow::bail!("--rank is only valid in worker mode");
            }
            _ => {}
        }

        if let Some(0) = self.workers {
            anyhow::bail!("workers must be at least 1");
        }

        if let Some(0) = self.top {
            anyhow::bail!("top must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tweetpulse").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["tweets.csv"]);
        assert_eq!(cli.mode, ExecutionMode::Standalone);
        assert_eq!(cli.input, Some(PathBuf::from("tweets.csv")));
        assert!(cli.workers.is_none());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parse_full_worker() {
        let cli = parse(&[
            "--mode",
            "worker",
            "--rank",
            "2",
            "-w",
            "4",
            "-s",
            "kanye",
            "--format",
            "twitter-csv",
            "--fan-in",
            "concurrent",
            "--coordinator-addr",
            "10.0.0.1:7077",
            "tweets.csv",
        ]);

        assert_eq!(cli.mode, ExecutionMode::Worker);
        assert_eq!(cli.rank, Some(2));
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.format, Some(RecordFormat::TwitterCsv));
        assert_eq!(cli.fan_in, Some(FanInMode::Concurrent));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_validate_rank_rules() {
        assert!(parse(&["--mode", "worker"]).validate().is_err());
        assert!(parse(&["--mode", "worker", "--rank", "0"]).validate().is_err());
        assert!(parse(&["--rank", "1"]).validate().is_err());
        assert!(parse(&["--mode", "coordinator", "--rank", "1"]).validate().is_err());
    }

    #[test]
    fn test_validate_zero_counts() {
        assert!(parse(&["-w", "0"]).validate().is_err());
        assert!(parse(&["-n", "0"]).validate().is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["tweetpulse", "--mode", "service"]).is_err());
    }
}
