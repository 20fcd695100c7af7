//! DiscoveryConfig: operator-managed matchers plus engine-owned status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::matcher::Matchers;
use crate::resource::SummaryKind;

/// State written by engines while they poll a config.
pub const STATE_SYNCING: &str = "DISCOVERY_CONFIG_STATE_SYNCING";

/// Per resource-type counters for one integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesDiscoveredSummary {
    pub found: u64,
    pub enrolled: u64,
    pub failed: u64,
}

impl ResourcesDiscoveredSummary {
    pub fn add(&mut self, other: &ResourcesDiscoveredSummary) {
        self.found += other.found;
        self.enrolled += other.enrolled;
        self.failed += other.failed;
    }
}

/// Counters of one integration, keyed by resource type.
pub type IntegrationDiscoveredSummary = BTreeMap<SummaryKind, ResourcesDiscoveredSummary>;

/// Status sub-object, overwritten by engines once per cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfigStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub discovered_resources: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub integration_discovered_resources: BTreeMap<String, IntegrationDiscoveredSummary>,
}

/// A named, versioned set of matchers for one discovery group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub name: String,
    pub discovery_group: String,
    #[serde(default)]
    pub matchers: Matchers,
    #[serde(default)]
    pub status: DiscoveryConfigStatus,
    /// Opaque revision assigned by the inventory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl DiscoveryConfig {
    pub fn new(
        name: impl Into<String>,
        discovery_group: impl Into<String>,
        matchers: Matchers,
    ) -> Self {
        Self {
            name: name.into(),
            discovery_group: discovery_group.into(),
            matchers,
            status: DiscoveryConfigStatus::default(),
            revision: None,
        }
    }
}
