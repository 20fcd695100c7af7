//! Well-known labels stamped on discovered resources, and tag/label selectors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who registered the resource.
pub const ORIGIN: &str = "skyscout.dev/origin";
/// Ownership partition of the engine that registered the resource.
pub const DISCOVERY_GROUP: &str = "skyscout.dev/discovery-group";
/// Name of the DiscoveryConfig whose matcher found the resource.
pub const DISCOVERY_CONFIG: &str = "skyscout.dev/discovery-config";
/// Integration (credential source) used to find the resource.
pub const INTEGRATION: &str = "skyscout.dev/integration";
/// Resource-type discovery tag, for example `ec2` or `rds`.
pub const DISCOVERY_TYPE: &str = "skyscout.dev/discovery-type";
/// Cloud provider the resource lives in.
pub const CLOUD: &str = "skyscout.dev/cloud";
/// Region or location.
pub const REGION: &str = "skyscout.dev/region";

pub const AWS_ACCOUNT_ID: &str = "skyscout.dev/account-id";
pub const AWS_INSTANCE_ID: &str = "skyscout.dev/instance-id";
pub const AZURE_SUBSCRIPTION_ID: &str = "skyscout.dev/subscription-id";
pub const AZURE_VM_ID: &str = "skyscout.dev/vm-id";
pub const GCP_PROJECT_ID: &str = "skyscout.dev/project-id";
pub const GCP_ZONE: &str = "skyscout.dev/zone";
pub const GCP_INSTANCE_NAME: &str = "skyscout.dev/instance-name";

pub const ORIGIN_CLOUD: &str = "cloud";
pub const ORIGIN_DYNAMIC: &str = "dynamic";
pub const ORIGIN_CONFIG_FILE: &str = "config-file";

/// The wildcard accepted for selector keys and values.
pub const WILDCARD: &str = "*";

/// Labels attached to every resource this engine registers.
pub type Labels = BTreeMap<String, String>;

/// A tag/label selector. Every entry must match; `*` matches anything.
///
/// A selector `{"*": ["*"]}` matches all resources, including untagged ones.
/// A key maps to a list of accepted values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSelector(pub BTreeMap<String, Vec<String>>);

impl LabelSelector {
    /// Selector matching everything.
    pub fn any() -> Self {
        let mut map = BTreeMap::new();
        map.insert(WILDCARD.to_string(), vec![WILDCARD.to_string()]);
        Self(map)
    }

    /// Builder helper accepting a single value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks cloud tags against this selector.
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(key, values)| {
            if key == WILDCARD {
                return values.iter().any(|v| v == WILDCARD)
                    || tags.values().any(|tv| values.contains(tv));
            }
            match tags.get(key) {
                Some(tag_value) => values.iter().any(|v| v == WILDCARD || v == tag_value),
                None => false,
            }
        })
    }
}

/// Extracts the origin label, if any.
pub fn origin(labels: &Labels) -> Option<&str> {
    labels.get(ORIGIN).map(String::as_str)
}

/// Extracts the discovery group label, treating an empty value as absent.
pub fn discovery_group(labels: &Labels) -> Option<&str> {
    labels
        .get(DISCOVERY_GROUP)
        .map(String::as_str)
        .filter(|g| !g.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_wildcard_matches_untagged() {
        assert!(LabelSelector::any().matches(&BTreeMap::new()));
    }

    #[test]
    fn test_selector_requires_every_key() {
        let selector = LabelSelector::default()
            .with("env", "dev")
            .with("team", "*");

        assert!(selector.matches(&tags(&[("env", "dev"), ("team", "db")])));
        assert!(!selector.matches(&tags(&[("env", "dev")])));
        assert!(!selector.matches(&tags(&[("env", "prod"), ("team", "db")])));
    }

    #[test]
    fn test_wildcard_key_with_value() {
        let selector = LabelSelector::default().with("*", "dev");
        assert!(selector.matches(&tags(&[("stage", "dev")])));
        assert!(!selector.matches(&tags(&[("stage", "prod")])));
    }

    #[test]
    fn test_empty_group_label_is_absent() {
        let mut labels = Labels::new();
        labels.insert(DISCOVERY_GROUP.to_string(), String::new());
        assert_eq!(discovery_group(&labels), None);

        labels.insert(DISCOVERY_GROUP.to_string(), "dg01".to_string());
        assert_eq!(discovery_group(&labels), Some("dg01"));
    }
}
