//! Opaque cloud listing contract.
//!
//! Each method lists one page of one record type within a scope. Scopes may be
//! `*` for Azure and GCP, in which case the implementation resolves every
//! subscription, resource group, project or location visible to the
//! credentials. Clients that do not support a record type keep the default,
//! which rejects the call as `BadParameter`.

use async_trait::async_trait;
use std::future::Future;

use skyscout_core::{AssumeRole, DiscoveryError, DiscoveryResult, Page};

use crate::records::{
    AwsDatabase, AzureAksCluster, AzureRedis, AzureVm, Ec2Instance, EksCluster, GceInstance,
    GkeCluster, KubeService,
};

/// Credential source for one call. How it authenticates is up to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CloudCredentials {
    pub integration: Option<String>,
    pub assume_role: Option<AssumeRole>,
}

/// Azure listing scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureScope {
    pub subscription: String,
    pub resource_group: String,
    pub region: String,
}

fn unsupported<T>(what: &str) -> DiscoveryResult<T> {
    Err(DiscoveryError::BadParameter(format!(
        "listing {what} is not supported by this client"
    )))
}

#[async_trait]
pub trait CloudClients: Send + Sync {
    async fn list_ec2_instances(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<Ec2Instance>> {
        unsupported("EC2 instances")
    }

    async fn list_eks_clusters(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<EksCluster>> {
        unsupported("EKS clusters")
    }

    async fn list_rds_databases(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        unsupported("RDS databases")
    }

    async fn list_redshift_clusters(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        unsupported("Redshift clusters")
    }

    async fn list_elasticache_clusters(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        unsupported("ElastiCache clusters")
    }

    async fn list_memorydb_clusters(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        unsupported("MemoryDB clusters")
    }

    async fn list_opensearch_domains(
        &self,
        _creds: &CloudCredentials,
        _region: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        unsupported("OpenSearch domains")
    }

    async fn list_azure_vms(
        &self,
        _creds: &CloudCredentials,
        _scope: &AzureScope,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureVm>> {
        unsupported("Azure virtual machines")
    }

    async fn list_aks_clusters(
        &self,
        _creds: &CloudCredentials,
        _scope: &AzureScope,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureAksCluster>> {
        unsupported("AKS clusters")
    }

    async fn list_azure_redis(
        &self,
        _creds: &CloudCredentials,
        _scope: &AzureScope,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureRedis>> {
        unsupported("Azure Redis caches")
    }

    async fn list_gce_instances(
        &self,
        _creds: &CloudCredentials,
        _project_id: &str,
        _location: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<GceInstance>> {
        unsupported("GCE instances")
    }

    async fn list_gke_clusters(
        &self,
        _creds: &CloudCredentials,
        _project_id: &str,
        _location: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<GkeCluster>> {
        unsupported("GKE clusters")
    }

    async fn list_kube_services(
        &self,
        _namespace: &str,
        _page_token: Option<String>,
    ) -> DiscoveryResult<Page<KubeService>> {
        unsupported("Kubernetes services")
    }
}

/// Calls `list_page` until the listing reports no further page.
pub async fn drain_pages<T, F, Fut>(mut list_page: F) -> DiscoveryResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = DiscoveryResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let page = list_page(token).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => return Ok(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoClients;

    #[async_trait]
    impl CloudClients for NoClients {}

    #[tokio::test]
    async fn test_default_methods_reject() {
        let err = NoClients
            .list_ec2_instances(&CloudCredentials::default(), "us-east-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::BadParameter(_)));
    }

    #[tokio::test]
    async fn test_drain_pages_follows_tokens() {
        let pages = vec![
            Page {
                items: vec![1, 2],
                next_token: Some("a".to_string()),
            },
            Page {
                items: vec![3],
                next_token: Some("b".to_string()),
            },
            Page::last(vec![4]),
        ];
        let mut calls = Vec::new();
        let all = drain_pages(|token| {
            calls.push(token);
            let page = pages[calls.len() - 1].clone();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(calls, vec![None, Some("a".to_string()), Some("b".to_string())]);
    }

    #[tokio::test]
    async fn test_drain_pages_propagates_errors() {
        let result: DiscoveryResult<Vec<u8>> = drain_pages(|_| async {
            Err(DiscoveryError::LimitExceeded("Rate exceeded".to_string()))
        })
        .await;
        assert!(result.unwrap_err().is_retryable());
    }
}
