//! tweetpulse CLI entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tweetpulse::config::cli::{Cli, ExecutionMode};
use tweetpulse::config::toml::load_config;
use tweetpulse::config::{validator, Config};
use tweetpulse::output::{self, FinalReport};
use tweetpulse::{job, util};

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = load_config(&cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;
    validator::validate_role(&config, cli.mode, cli.rank).context("Configuration validation failed")?;

    util::logging::init_tracing(config.runtime.log_format, config.runtime.debug)?;
    info!("tweetpulse v{} ({:?} mode)", env!("CARGO_PKG_VERSION"), cli.mode);

    if !config.output.quiet {
        print_configuration(&config);
    }

    if cli.dry_run {
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    match cli.mode {
        ExecutionMode::Standalone => run_standalone(config),
        ExecutionMode::Coordinator => run_coordinator(config),
        ExecutionMode::Worker => {
            let rank = cli.rank.context("--rank is required in worker mode")?;
            run_worker(config, rank)
        }
    }
}

/// Run in standalone mode (all ranks in this process)
fn run_standalone(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(job::run_local_cluster(config.clone()))?;

    emit_report(&config, &report)
}

/// Run as rank 0 over TCP
fn run_coordinator(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(job::run_tcp_coordinator(&config))?;

    emit_report(&config, &report)
}

/// Run as one worker rank over TCP
fn run_worker(config: Config, rank: usize) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(job::run_tcp_worker(&config, rank))?;

    info!(rank, "Worker finished");
    Ok(())
}

/// Print configuration summary
fn print_configuration(config: &Config) {
    println!("tweetpulse v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("{}", config);
    println!();
}

/// Text to stdout, JSON to file if configured
fn emit_report(config: &Config, report: &FinalReport) -> Result<()> {
    if !config.output.quiet {
        output::text::print_report(report);
    }

    if let Some(ref path) = config.output.json_output {
        output::json::write_json_report(path, report, true)?;
        info!("JSON report written to {}", path.display());
    }

    Ok(())
}
