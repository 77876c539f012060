//! Configuration sources feeding the snapshot store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docpolicy_core::{Error, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::{compute_fingerprint, RuleConfiguration};

/// Result of asking a source for configuration
#[derive(Debug, Clone)]
pub enum ConfigurationLoad {
    /// The source still holds the configuration identified by the hint
    Unchanged,

    /// Fresh configuration data
    Loaded {
        configuration: RuleConfiguration,
        /// When the source last persisted the data, if known
        persisted_date: Option<DateTime<Utc>>,
    },
}

/// Supplies rule configuration to the snapshot store
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &str;

    /// Load the configuration
    ///
    /// When `fingerprint_hint` matches the source's current data the source
    /// may answer [`ConfigurationLoad::Unchanged`].
    async fn load(&self, fingerprint_hint: Option<&str>) -> Result<ConfigurationLoad>;

    /// Fingerprint of the source's current data, used for change polling
    ///
    /// `None` means the source cannot tell cheaply.
    async fn current_fingerprint(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Configuration held in memory, replaceable at runtime
///
/// Used to inject configuration directly and to simulate an unreachable
/// backing store.
pub struct StaticConfigurationSource {
    configuration: RwLock<Option<RuleConfiguration>>,
    delay: Option<Duration>,
    loads: AtomicU64,
}

impl StaticConfigurationSource {
    /// Create a source serving `configuration`
    pub fn new(configuration: RuleConfiguration) -> Self {
        Self {
            configuration: RwLock::new(Some(configuration)),
            delay: None,
            loads: AtomicU64::new(0),
        }
    }

    /// Create a source that is currently unreachable
    pub fn unavailable() -> Self {
        Self {
            configuration: RwLock::new(None),
            delay: None,
            loads: AtomicU64::new(0),
        }
    }

    /// Wait before answering each load
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the served configuration
    pub fn replace(&self, configuration: RuleConfiguration) {
        *self.configuration.write() = Some(configuration);
    }

    /// Make the source unreachable until the next `replace`
    pub fn set_unavailable(&self) {
        *self.configuration.write() = None;
    }

    /// Number of `load` calls answered so far
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigurationSource for StaticConfigurationSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self, fingerprint_hint: Option<&str>) -> Result<ConfigurationLoad> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let configuration = self
            .configuration
            .read()
            .clone()
            .ok_or_else(|| Error::unavailable("static configuration source is unavailable"))?;

        if let Some(hint) = fingerprint_hint {
            if compute_fingerprint(&configuration)? == hint {
                return Ok(ConfigurationLoad::Unchanged);
            }
        }

        Ok(ConfigurationLoad::Loaded {
            configuration,
            persisted_date: None,
        })
    }

    async fn current_fingerprint(&self) -> Result<Option<String>> {
        let configuration = self.configuration.read().clone();
        match configuration {
            Some(configuration) => Ok(Some(compute_fingerprint(&configuration)?)),
            None => Err(Error::unavailable("static configuration source is unavailable")),
        }
    }
}

/// Configuration stored in a YAML or JSON rule file
pub struct FileConfigurationSource {
    path: PathBuf,
    name: String,
}

impl FileConfigurationSource {
    /// Create a source reading `path`; `.json` files are parsed as JSON, anything else as YAML
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<(RuleConfiguration, Option<DateTime<Utc>>)> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let persisted_date = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        let configuration = RuleConfiguration::parse_for_path(&self.path, &content)?;
        Ok((configuration, persisted_date))
    }
}

#[async_trait]
impl ConfigurationSource for FileConfigurationSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, fingerprint_hint: Option<&str>) -> Result<ConfigurationLoad> {
        let (configuration, persisted_date) = self.read().await?;

        if let Some(hint) = fingerprint_hint {
            if compute_fingerprint(&configuration)? == hint {
                debug!(path = %self.path.display(), "Rule file unchanged");
                return Ok(ConfigurationLoad::Unchanged);
            }
        }

        debug!(path = %self.path.display(), "Loaded rule file");
        Ok(ConfigurationLoad::Loaded {
            configuration,
            persisted_date,
        })
    }

    async fn current_fingerprint(&self) -> Result<Option<String>> {
        let (configuration, _) = self.read().await?;
        Ok(Some(compute_fingerprint(&configuration)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RULES: &str = "sequences:\n  - id: 1\n    name: S1\n";

    #[tokio::test]
    async fn test_static_source_unchanged_with_matching_hint() {
        let config = RuleConfiguration::from_yaml(RULES).unwrap();
        let fingerprint = config.fingerprint().unwrap();
        let source = StaticConfigurationSource::new(config);

        let load = source.load(Some(&fingerprint)).await.unwrap();
        assert!(matches!(load, ConfigurationLoad::Unchanged));

        let load = source.load(Some("other")).await.unwrap();
        assert!(matches!(load, ConfigurationLoad::Loaded { .. }));
        assert_eq!(source.load_count(), 2);
    }

    #[tokio::test]
    async fn test_static_source_unavailable() {
        let source = StaticConfigurationSource::unavailable();
        let err = source.load(None).await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationUnavailable(_)));
        assert!(source.current_fingerprint().await.is_err());
    }

    #[tokio::test]
    async fn test_file_source_reads_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();

        let source = FileConfigurationSource::new(file.path());
        match source.load(None).await.unwrap() {
            ConfigurationLoad::Loaded {
                configuration,
                persisted_date,
            } => {
                assert_eq!(configuration.sequences.len(), 1);
                assert!(persisted_date.is_some());
            }
            ConfigurationLoad::Unchanged => panic!("expected data"),
        }

        let fingerprint = source.current_fingerprint().await.unwrap().unwrap();
        let load = source.load(Some(&fingerprint)).await.unwrap();
        assert!(matches!(load, ConfigurationLoad::Unchanged));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileConfigurationSource::new("/nonexistent/docpolicy/rules.yaml");
        let err = source.load(None).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
