//! The fetch capability and its single cloud-backed implementation.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use skyscout_core::{
    AssumeRole, Cloud, DiscoveredResource, DiscoveryResult, InstallParams, LabelSelector,
    ResourceKind,
};

use crate::clients::{AzureScope, CloudClients, CloudCredentials, drain_pages};
use crate::convert::{Stamp, is_running};
use crate::kind::FetcherKind;
use crate::records::Tags;

/// Returns the current set of cloud resources matching one matcher scope.
///
/// Fetching only reads the cloud provider; it never touches the inventory.
/// Pagination is drained before returning and cloud errors are returned as-is.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self) -> DiscoveryResult<Vec<DiscoveredResource>>;

    fn kind(&self) -> FetcherKind;

    fn resource_kind(&self) -> ResourceKind {
        self.kind().resource_kind()
    }

    fn cloud(&self) -> Cloud {
        self.kind().cloud()
    }

    /// Region, subscription or project the fetcher is scoped to.
    fn scope(&self) -> String;

    fn integration(&self) -> Option<&str>;

    fn assume_role(&self) -> Option<&AssumeRole> {
        None
    }

    /// DiscoveryConfig the fetcher was built from; `None` for static matchers.
    fn discovery_config(&self) -> Option<&str>;

    fn install_params(&self) -> Option<&InstallParams>;

    /// Remote command document for compute installs.
    fn install_document(&self) -> Option<&str> {
        None
    }
}

/// Where a fetcher lists from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScope {
    Aws { region: String },
    Azure(AzureScope),
    Gcp { project_id: String, location: String },
    Kube { cluster: String, namespace: String },
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchScope::Aws { region } => f.write_str(region),
            FetchScope::Azure(scope) => write!(
                f,
                "{}/{}/{}",
                scope.subscription, scope.resource_group, scope.region
            ),
            FetchScope::Gcp {
                project_id,
                location,
            } => write!(f, "{project_id}/{location}"),
            FetchScope::Kube { cluster, namespace } => write!(f, "{cluster}/{namespace}"),
        }
    }
}

/// Fetcher for one (cloud, resource type, scope).
pub struct CloudFetcher {
    kind: FetcherKind,
    scope: FetchScope,
    selector: LabelSelector,
    credentials: CloudCredentials,
    stamp: Stamp,
    install: Option<InstallParams>,
    install_document: Option<String>,
    clients: Arc<dyn CloudClients>,
}

impl fmt::Debug for CloudFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudFetcher")
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("integration", &self.credentials.integration)
            .field("discovery_config", &self.stamp.discovery_config)
            .finish()
    }
}

impl CloudFetcher {
    pub fn new(
        kind: FetcherKind,
        scope: FetchScope,
        selector: LabelSelector,
        credentials: CloudCredentials,
        clients: Arc<dyn CloudClients>,
    ) -> Self {
        let stamp = Stamp {
            integration: credentials.integration.clone(),
            discovery_config: None,
            assume_role: credentials.assume_role.clone(),
        };
        Self {
            kind,
            scope,
            selector,
            credentials,
            stamp,
            install: None,
            install_document: None,
            clients,
        }
    }

    pub fn with_discovery_config(mut self, name: Option<String>) -> Self {
        self.stamp.discovery_config = name;
        self
    }

    pub fn with_install(mut self, params: Option<InstallParams>, document: Option<String>) -> Self {
        self.install = params;
        self.install_document = document;
        self
    }

    async fn fetch_aws(&self, region: &str) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let creds = &self.credentials;
        let clients = &self.clients;
        let selected = |tags: &Tags| self.selector.matches(tags);

        let out = match self.kind {
            FetcherKind::AwsEc2 => {
                drain_pages(|t| clients.list_ec2_instances(creds, region, t))
                    .await?
                    .iter()
                    .filter(|i| is_running(self.kind, &i.state) && selected(&i.tags))
                    .map(|i| self.stamp.ec2(i))
                    .collect()
            }
            FetcherKind::AwsEks => drain_pages(|t| clients.list_eks_clusters(creds, region, t))
                .await?
                .iter()
                .filter(|c| selected(&c.tags))
                .map(|c| self.stamp.eks(c))
                .collect(),
            kind => {
                let dbs = match kind {
                    FetcherKind::AwsRds => {
                        drain_pages(|t| clients.list_rds_databases(creds, region, t)).await?
                    }
                    FetcherKind::AwsRedshift => {
                        drain_pages(|t| clients.list_redshift_clusters(creds, region, t)).await?
                    }
                    FetcherKind::AwsElastiCache => {
                        drain_pages(|t| clients.list_elasticache_clusters(creds, region, t))
                            .await?
                    }
                    FetcherKind::AwsMemoryDb => {
                        drain_pages(|t| clients.list_memorydb_clusters(creds, region, t)).await?
                    }
                    _ => drain_pages(|t| clients.list_opensearch_domains(creds, region, t)).await?,
                };
                dbs.iter()
                    .filter(|db| selected(&db.tags))
                    .map(|db| self.stamp.aws_database(kind, db))
                    .collect()
            }
        };
        Ok(out)
    }

    async fn fetch_azure(&self, scope: &AzureScope) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let creds = &self.credentials;
        let clients = &self.clients;

        let out = match self.kind {
            FetcherKind::AzureVm => drain_pages(|t| clients.list_azure_vms(creds, scope, t))
                .await?
                .iter()
                .filter(|vm| is_running(self.kind, &vm.power_state))
                .filter(|vm| self.selector.matches(&vm.tags))
                .map(|vm| self.stamp.azure_vm(vm))
                .collect(),
            FetcherKind::AzureAks => drain_pages(|t| clients.list_aks_clusters(creds, scope, t))
                .await?
                .iter()
                .filter(|c| self.selector.matches(&c.tags))
                .map(|c| self.stamp.aks(c))
                .collect(),
            _ => drain_pages(|t| clients.list_azure_redis(creds, scope, t))
                .await?
                .iter()
                .filter(|r| self.selector.matches(&r.tags))
                .map(|r| self.stamp.azure_redis(r))
                .collect(),
        };
        Ok(out)
    }

    async fn fetch_gcp(
        &self,
        project_id: &str,
        location: &str,
    ) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let creds = &self.credentials;
        let clients = &self.clients;

        let out = match self.kind {
            FetcherKind::GcpGce => {
                drain_pages(|t| clients.list_gce_instances(creds, project_id, location, t))
                    .await?
                    .iter()
                    .filter(|i| is_running(self.kind, &i.status))
                    .filter(|i| self.selector.matches(&i.labels))
                    .map(|i| self.stamp.gce(i))
                    .collect()
            }
            _ => drain_pages(|t| clients.list_gke_clusters(creds, project_id, location, t))
                .await?
                .iter()
                .filter(|c| self.selector.matches(&c.labels))
                .map(|c| self.stamp.gke(c))
                .collect(),
        };
        Ok(out)
    }

    async fn fetch_kube(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let services = drain_pages(|t| self.clients.list_kube_services(namespace, t)).await?;
        Ok(services
            .iter()
            .filter(|s| self.selector.matches(&s.labels))
            .filter_map(|s| self.stamp.kube_app(cluster, s))
            .collect())
    }
}

#[async_trait]
impl ResourceFetcher for CloudFetcher {
    async fn fetch(&self) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let resources = match &self.scope {
            FetchScope::Aws { region } => self.fetch_aws(region).await?,
            FetchScope::Azure(scope) => self.fetch_azure(scope).await?,
            FetchScope::Gcp {
                project_id,
                location,
            } => self.fetch_gcp(project_id, location).await?,
            FetchScope::Kube { cluster, namespace } => self.fetch_kube(cluster, namespace).await?,
        };
        debug!(
            fetcher = %self.kind,
            scope = %self.scope,
            count = resources.len(),
            "Fetched cloud resources"
        );
        Ok(resources)
    }

    fn kind(&self) -> FetcherKind {
        self.kind
    }

    fn scope(&self) -> String {
        self.scope.to_string()
    }

    fn integration(&self) -> Option<&str> {
        self.credentials.integration.as_deref()
    }

    fn assume_role(&self) -> Option<&AssumeRole> {
        self.credentials.assume_role.as_ref()
    }

    fn discovery_config(&self) -> Option<&str> {
        self.stamp.discovery_config.as_deref()
    }

    fn install_params(&self) -> Option<&InstallParams> {
        self.install.as_ref()
    }

    fn install_document(&self) -> Option<&str> {
        self.install_document.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AwsDatabase, Ec2Instance};
    use skyscout_core::{AssumeRole, DiscoveryError, Page};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubClients {
        instances: Vec<Ec2Instance>,
        seen_credentials: Mutex<Vec<CloudCredentials>>,
    }

    #[async_trait]
    impl CloudClients for StubClients {
        async fn list_ec2_instances(
            &self,
            creds: &CloudCredentials,
            _region: &str,
            page_token: Option<String>,
        ) -> DiscoveryResult<Page<Ec2Instance>> {
            self.seen_credentials.lock().unwrap().push(creds.clone());
            // One instance per page.
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let next = index + 1;
            Ok(Page {
                items: self.instances.get(index).cloned().into_iter().collect(),
                next_token: (next < self.instances.len()).then(|| next.to_string()),
            })
        }

        async fn list_rds_databases(
            &self,
            _creds: &CloudCredentials,
            _region: &str,
            _page_token: Option<String>,
        ) -> DiscoveryResult<Page<AwsDatabase>> {
            Err(DiscoveryError::LimitExceeded("Rate exceeded".to_string()))
        }
    }

    fn instance(id: &str, state: &str, env: &str) -> Ec2Instance {
        let mut tags = Tags::new();
        tags.insert("env".to_string(), env.to_string());
        Ec2Instance {
            instance_id: id.to_string(),
            account_id: "123456789012".to_string(),
            region: "eu-west-1".to_string(),
            state: state.to_string(),
            tags,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ec2_fetch_drains_pages_and_filters() {
        let clients = Arc::new(StubClients {
            instances: vec![
                instance("i-1", "running", "dev"),
                instance("i-2", "stopped", "dev"),
                instance("i-3", "running", "prod"),
                instance("i-4", "running", "dev"),
            ],
            ..Default::default()
        });
        let credentials = CloudCredentials {
            integration: None,
            assume_role: Some(AssumeRole {
                role_arn: "arn:aws:iam::123456789012:role/discovery".to_string(),
                external_id: Some("ext".to_string()),
            }),
        };
        let fetcher = CloudFetcher::new(
            FetcherKind::AwsEc2,
            FetchScope::Aws {
                region: "eu-west-1".to_string(),
            },
            LabelSelector::default().with("env", "dev"),
            credentials.clone(),
            clients.clone(),
        );

        let found = fetcher.fetch().await.unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["aws-123456789012-i-1", "aws-123456789012-i-4"]);

        let seen = clients.seen_credentials.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|c| *c == credentials));
    }

    #[tokio::test]
    async fn test_cloud_errors_are_returned() {
        let fetcher = CloudFetcher::new(
            FetcherKind::AwsRds,
            FetchScope::Aws {
                region: "eu-west-1".to_string(),
            },
            LabelSelector::any(),
            CloudCredentials::default(),
            Arc::new(StubClients::default()),
        );
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::LimitExceeded(_)));
        assert_eq!(fetcher.resource_kind(), ResourceKind::Database);
    }
}
