use std::fmt;

use skyscout_core::matcher::types;
use skyscout_core::{Cloud, ResourceKind, SummaryKind};

/// Every supported (cloud, resource type) combination.
///
/// New combinations are added here; the fetcher dispatches on this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetcherKind {
    AwsEc2,
    AwsEks,
    AwsRds,
    AwsRedshift,
    AwsElastiCache,
    AwsMemoryDb,
    AwsOpenSearch,
    AzureVm,
    AzureAks,
    AzureRedis,
    GcpGce,
    GcpGke,
    KubeApp,
}

impl fmt::Display for FetcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cloud().as_str(), self.matcher_type())
    }
}

impl FetcherKind {
    /// Resolves a matcher resource-type name.
    pub fn from_matcher_type(cloud: Cloud, matcher_type: &str) -> Option<Self> {
        let kind = match (cloud, matcher_type) {
            (Cloud::Aws, types::AWS_EC2) => FetcherKind::AwsEc2,
            (Cloud::Aws, types::AWS_EKS) => FetcherKind::AwsEks,
            (Cloud::Aws, types::AWS_RDS) => FetcherKind::AwsRds,
            (Cloud::Aws, types::AWS_REDSHIFT) => FetcherKind::AwsRedshift,
            (Cloud::Aws, types::AWS_ELASTICACHE) => FetcherKind::AwsElastiCache,
            (Cloud::Aws, types::AWS_MEMORYDB) => FetcherKind::AwsMemoryDb,
            (Cloud::Aws, types::AWS_OPENSEARCH) => FetcherKind::AwsOpenSearch,
            (Cloud::Azure, types::AZURE_VM) => FetcherKind::AzureVm,
            (Cloud::Azure, types::AZURE_AKS) => FetcherKind::AzureAks,
            (Cloud::Azure, types::AZURE_REDIS) => FetcherKind::AzureRedis,
            (Cloud::Gcp, types::GCP_GCE) => FetcherKind::GcpGce,
            (Cloud::Gcp, types::GCP_GKE) => FetcherKind::GcpGke,
            (Cloud::Kubernetes, types::KUBE_APP) => FetcherKind::KubeApp,
            _ => return None,
        };
        Some(kind)
    }

    pub fn matcher_type(&self) -> &'static str {
        match self {
            FetcherKind::AwsEc2 => types::AWS_EC2,
            FetcherKind::AwsEks => types::AWS_EKS,
            FetcherKind::AwsRds => types::AWS_RDS,
            FetcherKind::AwsRedshift => types::AWS_REDSHIFT,
            FetcherKind::AwsElastiCache => types::AWS_ELASTICACHE,
            FetcherKind::AwsMemoryDb => types::AWS_MEMORYDB,
            FetcherKind::AwsOpenSearch => types::AWS_OPENSEARCH,
            FetcherKind::AzureVm => types::AZURE_VM,
            FetcherKind::AzureAks => types::AZURE_AKS,
            FetcherKind::AzureRedis => types::AZURE_REDIS,
            FetcherKind::GcpGce => types::GCP_GCE,
            FetcherKind::GcpGke => types::GCP_GKE,
            FetcherKind::KubeApp => types::KUBE_APP,
        }
    }

    pub fn cloud(&self) -> Cloud {
        match self {
            FetcherKind::AwsEc2
            | FetcherKind::AwsEks
            | FetcherKind::AwsRds
            | FetcherKind::AwsRedshift
            | FetcherKind::AwsElastiCache
            | FetcherKind::AwsMemoryDb
            | FetcherKind::AwsOpenSearch => Cloud::Aws,
            FetcherKind::AzureVm | FetcherKind::AzureAks | FetcherKind::AzureRedis => Cloud::Azure,
            FetcherKind::GcpGce | FetcherKind::GcpGke => Cloud::Gcp,
            FetcherKind::KubeApp => Cloud::Kubernetes,
        }
    }

    /// Inventory kind the fetched resources are registered as.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            FetcherKind::AwsEc2 | FetcherKind::AzureVm | FetcherKind::GcpGce => ResourceKind::Node,
            FetcherKind::AwsEks | FetcherKind::AzureAks | FetcherKind::GcpGke => {
                ResourceKind::KubeCluster
            }
            FetcherKind::AwsRds
            | FetcherKind::AwsRedshift
            | FetcherKind::AwsElastiCache
            | FetcherKind::AwsMemoryDb
            | FetcherKind::AwsOpenSearch
            | FetcherKind::AzureRedis => ResourceKind::Database,
            FetcherKind::KubeApp => ResourceKind::App,
        }
    }

    pub fn summary(&self) -> SummaryKind {
        match self {
            FetcherKind::AwsEc2 => SummaryKind::AwsEc2,
            FetcherKind::AwsEks => SummaryKind::AwsEks,
            FetcherKind::AwsRds => SummaryKind::AwsRds,
            FetcherKind::AwsRedshift
            | FetcherKind::AwsElastiCache
            | FetcherKind::AwsMemoryDb
            | FetcherKind::AwsOpenSearch => SummaryKind::AwsOtherDatabase,
            FetcherKind::AzureVm => SummaryKind::AzureVm,
            FetcherKind::AzureAks => SummaryKind::AzureAks,
            FetcherKind::AzureRedis => SummaryKind::AzureDatabase,
            FetcherKind::GcpGce => SummaryKind::GcpGce,
            FetcherKind::GcpGke => SummaryKind::GcpGke,
            FetcherKind::KubeApp => SummaryKind::KubeApp,
        }
    }

    pub fn is_compute(&self) -> bool {
        self.resource_kind() == ResourceKind::Node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FetcherKind::AwsEc2, "aws/ec2")]
    #[case(FetcherKind::AzureVm, "azure/vm")]
    #[case(FetcherKind::GcpGke, "gcp/gke")]
    #[case(FetcherKind::KubeApp, "kubernetes/app")]
    fn test_display_joins_cloud_and_matcher_type(#[case] kind: FetcherKind, #[case] text: &str) {
        assert_eq!(kind.to_string(), text);
    }
}
