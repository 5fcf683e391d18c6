//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::source::RecordFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete job configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Canonicalize values that are compared later (search term case)
    pub fn normalize(&mut self) {
        self.job.search_term = self.job.search_term.trim().to_ascii_lowercase();
    }
}

/// What to count and how to merge it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Token whose occurrences make up the scalar count
    #[serde(default)]
    pub search_term: String,
    /// Number of ranks, coordinator included
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Entries per ranking in the report
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Coordinator receive order
    #[serde(default)]
    pub fan_in: FanInMode,
}

fn default_worker_count() -> usize {
    1
}

fn default_top_n() -> usize {
    10
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            worker_count: default_worker_count(),
            top_n: default_top_n(),
            fan_in: FanInMode::default(),
        }
    }
}

/// Coordinator receive order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FanInMode {
    /// One rank at a time, in rank order
    Ordered,
    /// All ranks at once, merged as they complete
    Concurrent,
}

impl Default for FanInMode {
    fn default() -> Self {
        Self::Ordered
    }
}

/// Input records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Input file; every rank reads the same file
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub record_format: RecordFormat,
    /// Discard the first line before numbering records
    #[serde(default)]
    pub skip_header: bool,
}

/// TCP settings (coordinator and worker modes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the coordinator listens on and workers connect to
    pub coordinator_addr: Option<String>,
    /// Extra connect attempts while the coordinator is not up yet
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

fn default_connect_retries() -> u32 {
    30
}

fn default_connect_retry_delay_ms() -> u64 {
    1000
}

impl NetworkConfig {
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: None,
            connect_retries: default_connect_retries(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON report file path
    pub json_output: Option<PathBuf>,
    /// Skip the text report on stdout
    #[serde(default)]
    pub quiet: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Text
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Job: {}", self.job)?;
        writeln!(f, "  Source: {}", self.source)?;
        writeln!(f, "  Network: {}", self.network)?;
        writeln!(f, "  Output: {}", self.output)?;
        writeln!(f, "  Runtime: {}", self.runtime)?;
        Ok(())
    }
}

impl fmt::Display for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "search_term=\"{}\", workers={}, top_n={}, fan_in={}",
            self.search_term, self.worker_count, self.top_n, self.fan_in
        )
    }
}

impl fmt::Display for FanInMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanInMode::Ordered => write!(f, "ordered"),
            FanInMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(ref path) => write!(f, "{}", path.display())?,
            None => write!(f, "(none)")?,
        }
        write!(f, " ({})", self.record_format)?;
        if self.skip_header {
            write!(f, ", skip_header")?;
        }
        Ok(())
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coordinator_addr {
            Some(ref addr) => write!(f, "coordinator={}", addr)?,
            None => write!(f, "in-process")?,
        }
        write!(
            f,
            ", connect_retries={} every {}ms",
            self.connect_retries, self.connect_retry_delay_ms
        )
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref path) = self.json_output {
            parts.push(format!("json={}", path.display()));
        }
        if self.quiet {
            parts.push("quiet".to_string());
        }
        if parts.is_empty() {
            write!(f, "text")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "log_format={}", self.log_format)?;
        if self.debug {
            write!(f, ", debug")?;
        }
        Ok(())
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.job.worker_count, 1);
        assert_eq!(config.job.top_n, 10);
        assert_eq!(config.job.fan_in, FanInMode::Ordered);
        assert_eq!(config.source.record_format, RecordFormat::Plain);
        assert_eq!(config.network.connect_retries, 30);
        assert_eq!(config.network.connect_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.runtime.log_format, LogFormat::Text);
    }

    #[test]
    fn test_normalize_search_term() {
        let mut config = Config::default();
        config.job.search_term = "  Kanye ".to_string();
        config.normalize();
        assert_eq!(config.job.search_term, "kanye");
    }

    #[test]
    fn test_display_summary() {
        let mut config = Config::default();
        config.job.search_term = "kanye".into();
        config.source.path = Some(PathBuf::from("tweets.csv"));
        config.source.record_format = RecordFormat::TwitterCsv;

        let summary = config.to_string();
        assert!(summary.contains("search_term=\"kanye\""));
        assert!(summary.contains("tweets.csv (twitter-csv)"));
        assert!(summary.contains("in-process"));
    }
}
