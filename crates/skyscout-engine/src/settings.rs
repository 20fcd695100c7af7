//! Engine settings.
//!
//! Durations are written as humantime strings (`"5m"`, `"30s"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use skyscout_core::{DiscoveryError, DiscoveryResult, Matchers};

/// Settings of one discovery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Ownership partition shared with cooperating engines. May be empty when
    /// only static matchers are used.
    pub discovery_group: String,

    /// Time between discovery cycles
    #[serde(with = "humantime_secs")]
    pub poll_interval: Duration,

    /// Deadline of a single fetcher run
    #[serde(with = "humantime_secs")]
    pub fetch_timeout: Duration,

    /// Deadline of a single instance installation
    #[serde(with = "humantime_secs")]
    pub install_timeout: Duration,

    /// Installations running at the same time
    pub install_concurrency: usize,

    /// Resources reconciled per batch
    pub reconcile_chunk_size: usize,

    /// Delay before re-subscribing after the config watch fails
    #[serde(with = "humantime_secs")]
    pub watch_retry_interval: Duration,

    /// Discard matchers that do not name an integration
    pub integration_only_credentials: bool,

    /// Cluster this engine runs in, for Kubernetes app discovery
    pub kube_cluster_name: Option<String>,

    /// Static matchers, fixed for the engine's lifetime
    pub matchers: Matchers,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            discovery_group: String::new(),
            poll_interval: Duration::from_secs(5 * 60),
            fetch_timeout: Duration::from_secs(2 * 60),
            install_timeout: Duration::from_secs(10 * 60),
            install_concurrency: 10,
            reconcile_chunk_size: 50,
            watch_retry_interval: Duration::from_secs(5),
            integration_only_credentials: false,
            kube_cluster_name: None,
            matchers: Matchers::default(),
        }
    }
}

impl EngineSettings {
    pub fn new(discovery_group: impl Into<String>) -> Self {
        Self {
            discovery_group: discovery_group.into(),
            ..Default::default()
        }
    }

    pub fn with_matchers(mut self, matchers: Matchers) -> Self {
        self.matchers = matchers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_kube_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.kube_cluster_name = Some(name.into());
        self
    }

    pub fn with_integration_only_credentials(mut self, enabled: bool) -> Self {
        self.integration_only_credentials = enabled;
        self
    }

    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DiscoveryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiscoveryError::BadParameter(format!("Failed to read settings file: {}", e))
        })?;
        Self::load_from_toml(&content)
    }

    /// Load settings from a TOML string
    pub fn load_from_toml(content: &str) -> DiscoveryResult<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| {
            DiscoveryError::BadParameter(format!("Failed to parse TOML settings: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> DiscoveryResult<()> {
        let zero = |field: &str| {
            Err(DiscoveryError::BadParameter(format!(
                "{field} must be greater than zero"
            )))
        };
        if self.poll_interval.is_zero() {
            return zero("poll_interval");
        }
        if self.fetch_timeout.is_zero() {
            return zero("fetch_timeout");
        }
        if self.install_timeout.is_zero() {
            return zero("install_timeout");
        }
        if self.watch_retry_interval.is_zero() {
            return zero("watch_retry_interval");
        }
        if self.install_concurrency == 0 {
            return zero("install_concurrency");
        }
        if self.reconcile_chunk_size == 0 {
            return zero("reconcile_chunk_size");
        }
        Ok(())
    }
}

mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(300));
        assert_eq!(settings.reconcile_chunk_size, 50);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let settings = EngineSettings::load_from_toml(
            r#"
            discovery_group = "dg01"
            poll_interval = "30s"
            integration_only_credentials = true

            [[matchers.aws]]
            types = ["ec2"]
            regions = ["eu-west-1"]
            integration = "my-integration"

            [matchers.aws.tags]
            env = ["dev"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.discovery_group, "dg01");
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(120));
        assert!(settings.integration_only_credentials);
        assert_eq!(settings.matchers.aws.len(), 1);
        assert!(
            settings.matchers.aws[0]
                .tags
                .matches(&[("env".to_string(), "dev".to_string())].into_iter().collect())
        );
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = EngineSettings::load_from_toml("reconcile_chunk_size = 0").unwrap_err();
        assert!(matches!(err, DiscoveryError::BadParameter(_)));
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(EngineSettings::load_from_toml(r#"poll_interval = "soon""#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"discovery_group = "main""#).unwrap();
        let settings = EngineSettings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.discovery_group, "main");

        assert!(EngineSettings::load_from_file("/nonexistent/skyscout.toml").is_err());
    }
}
