//! Per-cycle discovery counters and their persistence on DiscoveryConfigs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use skyscout_core::{
    AccessPoint, Clock, DiscoveryConfigStatus, DiscoveryResult, IntegrationDiscoveredSummary,
    ResourcesDiscoveredSummary, STATE_SYNCING, SummaryKind,
};

/// Counters of one DiscoveryConfig for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigCounts {
    pub discovered: u64,
    pub integrations: BTreeMap<String, IntegrationDiscoveredSummary>,
}

impl ConfigCounts {
    pub fn summary(&self, integration: &str, kind: SummaryKind) -> ResourcesDiscoveredSummary {
        self.integrations
            .get(integration)
            .and_then(|kinds| kinds.get(&kind))
            .copied()
            .unwrap_or_default()
    }
}

/// Where a counted resource came from.
#[derive(Debug, Clone, Copy)]
pub struct CountKey<'a> {
    pub discovery_config: Option<&'a str>,
    pub integration: Option<&'a str>,
    pub summary: SummaryKind,
}

/// Counters accumulated in memory during one cycle.
///
/// Resources from static matchers carry no DiscoveryConfig and are not
/// counted. Resources without an integration only count towards the config's
/// discovered total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleCounts {
    configs: BTreeMap<String, ConfigCounts>,
}

impl CycleCounts {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&mut self, key: CountKey<'_>) -> Option<&mut ResourcesDiscoveredSummary> {
        let config = self
            .configs
            .entry(key.discovery_config?.to_string())
            .or_default();
        let integration = key.integration.filter(|i| !i.is_empty())?;
        Some(
            config
                .integrations
                .entry(integration.to_string())
                .or_default()
                .entry(key.summary)
                .or_default(),
        )
    }

    pub fn found(&mut self, key: CountKey<'_>, count: u64) {
        if let Some(name) = key.discovery_config {
            self.configs.entry(name.to_string()).or_default().discovered += count;
        }
        if let Some(bucket) = self.bucket(key) {
            bucket.found += count;
        }
    }

    pub fn enrolled(&mut self, key: CountKey<'_>, count: u64) {
        if let Some(bucket) = self.bucket(key) {
            bucket.enrolled += count;
        }
    }

    pub fn failed(&mut self, key: CountKey<'_>, count: u64) {
        if let Some(bucket) = self.bucket(key) {
            bucket.failed += count;
        }
    }

    pub fn config(&self, name: &str) -> Option<&ConfigCounts> {
        self.configs.get(name)
    }
}

/// Persists cycle counters onto DiscoveryConfig status.
pub struct StatusReporter {
    access_point: Arc<dyn AccessPoint>,
    clock: Arc<dyn Clock>,
}

impl StatusReporter {
    pub fn new(access_point: Arc<dyn AccessPoint>, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_point,
            clock,
        }
    }

    /// Writes the status of every config in `configs`, including those that
    /// found nothing. Returns the names whose write was dropped.
    pub async fn report(&self, configs: &BTreeSet<String>, counts: &CycleCounts) -> Vec<String> {
        let sync_time = self.clock.now();
        let mut dropped = Vec::new();
        for name in configs {
            let config_counts = counts.config(name).cloned().unwrap_or_default();
            let status = DiscoveryConfigStatus {
                state: STATE_SYNCING.to_string(),
                error_message: None,
                discovered_resources: config_counts.discovered,
                last_sync_time: Some(sync_time),
                integration_discovered_resources: config_counts.integrations,
            };
            if let Err(err) = self.write(name, status).await {
                warn!(
                    discovery_config = %name,
                    error = %err,
                    "Dropping discovery config status update for this cycle"
                );
                dropped.push(name.clone());
            }
        }
        dropped
    }

    /// One conditional write; a lost race is retried once against the fresh
    /// revision.
    async fn write(&self, name: &str, status: DiscoveryConfigStatus) -> DiscoveryResult<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.access_point.get_discovery_config(name).await?;
            match self
                .access_point
                .update_discovery_config_status(name, status.clone(), current.revision.as_deref())
                .await
            {
                Ok(_) => {
                    debug!(
                        discovery_config = %name,
                        discovered = status.discovered_resources,
                        "Updated discovery config status"
                    );
                    return Ok(());
                }
                Err(err) if err.is_compare_failed() && attempts < 2 => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
