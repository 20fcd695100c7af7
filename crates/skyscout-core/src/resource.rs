//! Inventory resources and the discovered-resource envelope.

use serde::{Deserialize, Serialize};

use crate::labels::{self, Labels};
use crate::matcher::{AssumeRole, Cloud};
use crate::naming::InstanceIdentity;

/// Kind of inventory resource the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Node,
    KubeCluster,
    Database,
    App,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Node,
        ResourceKind::KubeCluster,
        ResourceKind::Database,
        ResourceKind::App,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::KubeCluster => "kube_cluster",
            ResourceKind::Database => "db",
            ResourceKind::App => "app",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name, labels and backend revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub labels: Labels,
    /// Opaque revision assigned by the inventory on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub hostname: String,
    pub addr: String,
    pub identity: InstanceIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeClusterSpec {
    pub cloud: Cloud,
    /// Account, subscription or project.
    pub account: String,
    pub region: String,
    /// Native cluster name, as the enroller expects it.
    pub cluster_name: String,
}

/// Cloud-side metadata of a database endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCloudMeta {
    /// Account, subscription or project.
    pub account: String,
    pub region: String,
    /// Native identifier as reported by the provider.
    pub native_name: String,
    /// Engine as reported by the provider, for example `postgres`.
    pub engine: String,
    #[serde(default)]
    pub is_cluster: bool,
    #[serde(default)]
    pub iam_auth_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assume_role: Option<AssumeRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub protocol: String,
    pub uri: String,
    pub cloud: Cloud,
    pub meta: DatabaseCloudMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Node(NodeSpec),
    KubeCluster(KubeClusterSpec),
    Database(DatabaseSpec),
    App(AppSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Node(_) => ResourceKind::Node,
            ResourceSpec::KubeCluster(_) => ResourceKind::KubeCluster,
            ResourceSpec::Database(_) => ResourceKind::Database,
            ResourceSpec::App(_) => ResourceKind::App,
        }
    }
}

/// A resource as stored in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub metadata: Metadata,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn new(name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                ..Default::default()
            },
            spec,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn labels(&self) -> &Labels {
        &self.metadata.labels
    }

    pub fn origin(&self) -> Option<&str> {
        labels::origin(&self.metadata.labels)
    }

    pub fn discovery_group(&self) -> Option<&str> {
        labels::discovery_group(&self.metadata.labels)
    }

    pub fn discovery_config(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(labels::DISCOVERY_CONFIG)
            .map(String::as_str)
    }

    pub fn integration(&self) -> Option<&str> {
        self.metadata
            .labels
            .get(labels::INTEGRATION)
            .map(String::as_str)
            .filter(|i| !i.is_empty())
    }

    /// Whether labels, description or spec differ. Revisions are ignored.
    pub fn differs_from(&self, other: &Resource) -> bool {
        self.metadata.name != other.metadata.name
            || self.metadata.description != other.metadata.description
            || self.metadata.labels != other.metadata.labels
            || self.spec != other.spec
    }

    /// Cloud identity of a node, either from its spec or its labels.
    pub fn instance_identity(&self) -> Option<InstanceIdentity> {
        match &self.spec {
            ResourceSpec::Node(node) => Some(node.identity.clone()),
            _ => InstanceIdentity::from_labels(&self.metadata.labels),
        }
    }
}

/// Usage/status bucket a discovered resource is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    AwsEc2,
    AwsRds,
    AwsEks,
    AwsOtherDatabase,
    AzureVm,
    AzureAks,
    AzureDatabase,
    GcpGce,
    GcpGke,
    KubeApp,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::AwsEc2 => "aws_ec2",
            SummaryKind::AwsRds => "aws_rds",
            SummaryKind::AwsEks => "aws_eks",
            SummaryKind::AwsOtherDatabase => "aws_database",
            SummaryKind::AzureVm => "azure_vm",
            SummaryKind::AzureAks => "azure_aks",
            SummaryKind::AzureDatabase => "azure_database",
            SummaryKind::GcpGce => "gcp_gce",
            SummaryKind::GcpGke => "gcp_gke",
            SummaryKind::KubeApp => "kube_app",
        }
    }
}

/// A freshly fetched resource together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub resource: Resource,
    pub summary: SummaryKind,
    /// Matcher resource type, for example `ec2`.
    pub matcher_type: &'static str,
    pub cloud: Cloud,
}

impl DiscoveredResource {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> Resource {
        Resource::new(
            name,
            ResourceSpec::App(AppSpec {
                uri: "http://svc.ns.svc.cluster.local:80".to_string(),
                public_addr: String::new(),
            }),
        )
    }

    #[test]
    fn test_differs_ignores_revision() {
        let a = app("web").with_label(labels::ORIGIN, labels::ORIGIN_CLOUD);
        let mut b = a.clone();
        b.metadata.revision = Some("7".to_string());
        assert!(!a.differs_from(&b));

        let c = b.clone().with_label("env", "dev");
        assert!(a.differs_from(&c));
    }

    #[test]
    fn test_kind_from_spec() {
        assert_eq!(app("web").kind(), ResourceKind::App);
        assert_eq!(ResourceKind::KubeCluster.to_string(), "kube_cluster");
    }
}
