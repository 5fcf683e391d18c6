//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    // Override job settings
    if let Some(ref term) = cli.search_term {
        config.job.search_term = term.clone();
    }
    if let Some(workers) = cli.workers {
        config.job.worker_count = workers;
    }
    if let Some(top) = cli.top {
        config.job.top_n = top;
    }
    if let Some(fan_in) = cli.fan_in {
        config.job.fan_in = fan_in;
    }

    // Override source settings
    if let Some(ref path) = cli.input {
        config.source.path = Some(path.clone());
    }
    if let Some(format) = cli.format {
        config.source.record_format = format;
    }
    if cli.skip_header {
        config.source.skip_header = true;
    }

    // Override network settings
    if let Some(ref addr) = cli.coordinator_addr {
        config.network.coordinator_addr = Some(addr.clone());
    }
    if let Some(retries) = cli.connect_retries {
        config.network.connect_retries = retries;
    }
    if let Some(delay) = cli.connect_retry_delay_ms {
        config.network.connect_retry_delay_ms = delay;
    }

    // Override output settings
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }
    if cli.quiet {
        config.output.quiet = true;
    }

    // Override runtime settings
    if cli.debug {
        config.runtime.debug = true;
    }
    if let Some(format) = cli.log_format {
        config.runtime.log_format = format;
    }

    config
}

/// Build the effective configuration: file (if any), then CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    let mut config = merge_cli_with_config(cli, base);
    config.normalize();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    const SAMPLE: &str = r#"
[job]
search_term = "Kanye"
worker_count = 4
fan_in = "concurrent"

[source]
path = "/data/tweets.csv"
record_format = "twitter-csv"
skip_header = true

[network]
coordinator_addr = "10.0.0.1:7077"

[output]
json_output = "report.json"
"#;

    #[test]
    fn test_parse_full_file() {
        let config = parse_toml_string(SAMPLE).unwrap();
        assert_eq!(config.job.search_term, "Kanye");
        assert_eq!(config.job.worker_count, 4);
        assert_eq!(config.job.top_n, 10);
        assert_eq!(config.job.fan_in, FanInMode::Concurrent);
        assert_eq!(config.source.record_format, RecordFormat::TwitterCsv);
        assert!(config.source.skip_header);
        assert_eq!(config.network.coordinator_addr.as_deref(), Some("10.0.0.1:7077"));
        assert_eq!(config.network.connect_retries, 30);
        assert_eq!(config.output.json_output, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_parse_empty_file_uses_defaults() {
        assert_eq!(parse_toml_string("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        let err = parse_toml_string("[source]\nrecord_format = \"xml\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config_path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "tweetpulse",
            "--config",
            config_path.as_str(),
            "-w",
            "2",
            "--fan-in",
            "ordered",
            "other.csv",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.job.worker_count, 2);
        assert_eq!(config.job.fan_in, FanInMode::Ordered);
        assert_eq!(config.source.path, Some(PathBuf::from("other.csv")));
        // Untouched by the CLI, and normalized
        assert_eq!(config.job.search_term, "kanye");
        assert!(config.source.skip_header);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::try_parse_from(["tweetpulse", "--config", "/nonexistent/tweetpulse.toml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
