//! CLI configuration
//!
//! Settings are layered: defaults, then an optional `docpolicy.yaml`, then
//! `DOCPOLICY_*` environment variables, then command line flags.

use docpolicy_engine::{DefaultCollectionTieBreak, PipelineSettings, SnapshotStoreSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Classification settings for the `docpolicy` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Rule file (YAML, or JSON with a `.json` extension)
    pub rules_path: PathBuf,

    /// Documents classified at the same time, defaults to the CPU count
    pub concurrency: Option<usize>,

    /// Per-document timeout in milliseconds
    pub document_timeout_ms: Option<u64>,

    /// How often the rule file is re-checked for changes, in milliseconds
    pub refresh_interval_ms: Option<u64>,

    /// Default collection pick among several matches
    pub tie_break: DefaultCollectionTieBreak,

    /// Longest allowed chain of condition references
    pub max_reference_depth: usize,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

impl CliConfig {
    /// Load configuration from file and environment, then apply CLI overrides
    pub fn load(config_path: &Path, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config: Self = config::Config::builder()
            .add_source(config::File::from(config_path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("DOCPOLICY").try_parsing(true))
            .build()?
            .try_deserialize()?;

        if let Some(rules) = &cli.rules {
            config.rules_path = rules.clone();
        }

        if let Some(concurrency) = cli.concurrency {
            config.concurrency = Some(concurrency);
        }

        if let Some(timeout) = cli.timeout_ms {
            config.document_timeout_ms = Some(timeout);
        }

        if let Some(tie_break) = cli.tie_break {
            config.tie_break = tie_break;
        }

        Ok(config)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        PipelineSettings {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
            document_timeout: self.document_timeout_ms.map(Duration::from_millis),
            tie_break: self.tie_break,
            max_reference_depth: self.max_reference_depth,
        }
    }

    pub fn store_settings(&self) -> SnapshotStoreSettings {
        SnapshotStoreSettings {
            refresh_interval: self.refresh_interval_ms.map(Duration::from_millis),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("rules.yaml"),
            concurrency: None,
            document_timeout_ms: None,
            refresh_interval_ms: None,
            tie_break: DefaultCollectionTieBreak::default(),
            max_reference_depth: docpolicy_engine::DEFAULT_MAX_REFERENCE_DEPTH,
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Install the Prometheus recorder and print rendered metrics after a run
    pub prometheus: bool,
}

/// Parse a tie-break name as given on the command line
pub fn parse_tie_break(value: &str) -> Result<DefaultCollectionTieBreak, String> {
    match value {
        "lowest_id" | "lowest" => Ok(DefaultCollectionTieBreak::LowestId),
        "highest_id" | "highest" => Ok(DefaultCollectionTieBreak::HighestId),
        "none" => Ok(DefaultCollectionTieBreak::None),
        other => Err(format!(
            "unknown tie-break '{}', expected lowest_id, highest_id or none",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> crate::Cli {
        let mut argv = vec!["docpolicy"];
        argv.extend_from_slice(args);
        argv.push("fingerprint");
        crate::Cli::parse_from(argv)
    }

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::load(Path::new("/nonexistent/docpolicy.yaml"), &cli(&[])).unwrap();

        assert_eq!(config.tie_break, DefaultCollectionTieBreak::LowestId);
        assert_eq!(config.max_reference_depth, 32);
        assert!(config.pipeline_settings().concurrency >= 1);
        assert!(config.store_settings().refresh_interval.is_none());
    }

    #[test]
    fn test_file_then_cli_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "rules_path: from-file.yaml\nconcurrency: 2\ndocument_timeout_ms: 250\ntie_break: highest_id"
        )
        .unwrap();

        let config = CliConfig::load(file.path(), &cli(&["--concurrency", "8"])).unwrap();

        assert_eq!(config.rules_path, PathBuf::from("from-file.yaml"));
        assert_eq!(config.concurrency, Some(8));
        assert_eq!(config.tie_break, DefaultCollectionTieBreak::HighestId);

        let settings = config.pipeline_settings();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.document_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_tie_break() {
        assert_eq!(parse_tie_break("none"), Ok(DefaultCollectionTieBreak::None));
        assert_eq!(parse_tie_break("highest"), Ok(DefaultCollectionTieBreak::HighestId));
        assert!(parse_tie_break("random").is_err());
    }
}
