//! Matchers: which cloud resources a fetcher should return.
//!
//! Matchers are immutable once handed to a fetcher. A changed configuration
//! is realised by building new fetchers, never by mutating existing ones.

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::labels::{LabelSelector, WILDCARD};

/// Resource-type names accepted in matchers.
pub mod types {
    pub const AWS_EC2: &str = "ec2";
    pub const AWS_EKS: &str = "eks";
    pub const AWS_RDS: &str = "rds";
    pub const AWS_REDSHIFT: &str = "redshift";
    pub const AWS_ELASTICACHE: &str = "elasticache";
    pub const AWS_MEMORYDB: &str = "memorydb";
    pub const AWS_OPENSEARCH: &str = "opensearch";

    pub const AZURE_VM: &str = "vm";
    pub const AZURE_AKS: &str = "aks";
    pub const AZURE_REDIS: &str = "redis";

    pub const GCP_GCE: &str = "gce";
    pub const GCP_GKE: &str = "gke";

    pub const KUBE_APP: &str = "app";

    pub const AWS: &[&str] = &[
        AWS_EC2,
        AWS_EKS,
        AWS_RDS,
        AWS_REDSHIFT,
        AWS_ELASTICACHE,
        AWS_MEMORYDB,
        AWS_OPENSEARCH,
    ];
    pub const AZURE: &[&str] = &[AZURE_VM, AZURE_AKS, AZURE_REDIS];
    pub const GCP: &[&str] = &[GCP_GCE, GCP_GKE];
    pub const KUBERNETES: &[&str] = &[KUBE_APP];
}

/// Cloud provider a matcher targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Aws,
    Azure,
    Gcp,
    Kubernetes,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Aws => "aws",
            Cloud::Azure => "azure",
            Cloud::Gcp => "gcp",
            Cloud::Kubernetes => "kubernetes",
        }
    }

    /// Provider name as reported in usage events.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Cloud::Aws => "AWS",
            Cloud::Azure => "Azure",
            Cloud::Gcp => "GCP",
            Cloud::Kubernetes => "Kubernetes",
        }
    }
}

impl std::fmt::Display for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role to assume before calling the cloud API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssumeRole {
    pub role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Parameters handed to the remote executor when bootstrapping an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallParams {
    /// Join token the agent presents on first connect.
    pub join_token: String,
    /// Installer script name.
    #[serde(default = "default_script_name")]
    pub script_name: String,
    /// Address the installed agent should connect to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_addr: Option<String>,
}

/// Installer script used when a matcher does not name one.
pub const DEFAULT_INSTALL_SCRIPT: &str = "default-installer";

fn default_script_name() -> String {
    DEFAULT_INSTALL_SCRIPT.to_string()
}

/// Matcher for AWS resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsMatcher {
    pub types: Vec<String>,
    pub regions: Vec<String>,
    #[serde(default)]
    pub tags: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assume_role: Option<AssumeRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallParams>,
    /// Remote command document used to run the installer on EC2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssm_document: Option<String>,
}

/// Matcher for Azure resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureMatcher {
    pub types: Vec<String>,
    #[serde(default = "wildcard_scope")]
    pub subscriptions: Vec<String>,
    #[serde(default = "wildcard_scope")]
    pub resource_groups: Vec<String>,
    #[serde(default = "wildcard_scope")]
    pub regions: Vec<String>,
    #[serde(default)]
    pub resource_tags: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallParams>,
}

/// Matcher for GCP resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpMatcher {
    pub types: Vec<String>,
    pub project_ids: Vec<String>,
    #[serde(default = "wildcard_scope")]
    pub locations: Vec<String>,
    #[serde(default)]
    pub labels: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallParams>,
}

/// Matcher for applications exposed by Kubernetes services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesMatcher {
    pub types: Vec<String>,
    #[serde(default = "wildcard_scope")]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub labels: LabelSelector,
}

fn wildcard_scope() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

/// Matchers of every cloud, as carried by settings and DiscoveryConfigs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchers {
    #[serde(default)]
    pub aws: Vec<AwsMatcher>,
    #[serde(default)]
    pub azure: Vec<AzureMatcher>,
    #[serde(default)]
    pub gcp: Vec<GcpMatcher>,
    #[serde(default)]
    pub kubernetes: Vec<KubernetesMatcher>,
}

impl Matchers {
    pub fn is_empty(&self) -> bool {
        self.aws.is_empty()
            && self.azure.is_empty()
            && self.gcp.is_empty()
            && self.kubernetes.is_empty()
    }

    /// Drops matchers that do not name an integration.
    ///
    /// Kubernetes matchers never carry an integration and are always dropped.
    /// Returns how many matchers were discarded.
    pub fn retain_integration_only(&mut self) -> usize {
        let before = self.len();
        self.aws.retain(|m| has_integration(&m.integration));
        self.azure.retain(|m| has_integration(&m.integration));
        self.gcp.retain(|m| has_integration(&m.integration));
        self.kubernetes.clear();
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.aws.len() + self.azure.len() + self.gcp.len() + self.kubernetes.len()
    }

    /// Rejects unknown resource types.
    pub fn validate(&self) -> DiscoveryResult<()> {
        for m in &self.aws {
            check_types(Cloud::Aws, &m.types, types::AWS)?;
        }
        for m in &self.azure {
            check_types(Cloud::Azure, &m.types, types::AZURE)?;
        }
        for m in &self.gcp {
            check_types(Cloud::Gcp, &m.types, types::GCP)?;
        }
        for m in &self.kubernetes {
            check_types(Cloud::Kubernetes, &m.types, types::KUBERNETES)?;
        }
        Ok(())
    }
}

fn has_integration(integration: &Option<String>) -> bool {
    integration.as_deref().is_some_and(|i| !i.is_empty())
}

fn check_types(cloud: Cloud, requested: &[String], known: &[&str]) -> DiscoveryResult<()> {
    if requested.is_empty() {
        return Err(DiscoveryError::BadParameter(format!(
            "{cloud} matcher has no resource types"
        )));
    }
    for t in requested {
        if !known.contains(&t.as_str()) {
            return Err(DiscoveryError::BadParameter(format!(
                "unsupported {cloud} resource type {t:?}"
            )));
        }
    }
    Ok(())
}
