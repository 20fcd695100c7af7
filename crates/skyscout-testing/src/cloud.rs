//! Scriptable cloud provider.
//!
//! Records are filtered by the requested scope the way a real provider would:
//! AWS by region, Azure by subscription, resource group and region, GCP by
//! project and location. `*` matches everything.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use skyscout_core::labels::WILDCARD;
use skyscout_core::{DiscoveryError, DiscoveryResult, Page};
use skyscout_fetchers::records::{
    AwsDatabase, AzureAksCluster, AzureRedis, AzureVm, Ec2Instance, EksCluster, GceInstance,
    GkeCluster, KubeService,
};
use skyscout_fetchers::{AzureScope, CloudClients, CloudCredentials};

/// One listing call of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Ec2,
    Eks,
    Rds,
    Redshift,
    ElastiCache,
    MemoryDb,
    OpenSearch,
    AzureVm,
    Aks,
    AzureRedis,
    Gce,
    Gke,
    KubeServices,
}

#[derive(Default)]
struct Inventory {
    ec2: Vec<Ec2Instance>,
    eks: Vec<EksCluster>,
    databases: HashMap<Listing, Vec<AwsDatabase>>,
    azure_vms: Vec<AzureVm>,
    aks: Vec<AzureAksCluster>,
    azure_redis: Vec<AzureRedis>,
    gce: Vec<GceInstance>,
    gke: Vec<GkeCluster>,
    services: Vec<KubeService>,
    errors: HashMap<Listing, DiscoveryError>,
    calls: Vec<(Listing, CloudCredentials)>,
}

/// In-memory [`CloudClients`].
pub struct FakeCloudClients {
    inventory: Mutex<Inventory>,
    page_size: usize,
}

impl Default for FakeCloudClients {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped(requested: &str, actual: &str) -> bool {
    requested == WILDCARD || requested == actual
}

fn page_of<T: Clone>(items: Vec<T>, page_size: usize, token: Option<String>) -> Page<T> {
    let start = token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        next_token: (end < items.len()).then(|| end.to_string()),
    }
}

impl FakeCloudClients {
    pub fn new() -> Self {
        Self {
            inventory: Mutex::new(Inventory::default()),
            page_size: 100,
        }
    }

    /// Sets how many records each listing page holds.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add_ec2(&self, instance: Ec2Instance) {
        self.inventory.lock().unwrap().ec2.push(instance);
    }

    pub fn remove_ec2(&self, instance_id: &str) {
        let mut inventory = self.inventory.lock().unwrap();
        inventory.ec2.retain(|i| i.instance_id != instance_id);
    }

    pub fn add_eks(&self, cluster: EksCluster) {
        self.inventory.lock().unwrap().eks.push(cluster);
    }

    /// Adds an AWS database to the given listing (`Rds`, `Redshift`, ...).
    pub fn add_database(&self, listing: Listing, database: AwsDatabase) {
        let mut inventory = self.inventory.lock().unwrap();
        inventory.databases.entry(listing).or_default().push(database);
    }

    pub fn remove_database(&self, listing: Listing, identifier: &str) {
        let mut inventory = self.inventory.lock().unwrap();
        if let Some(databases) = inventory.databases.get_mut(&listing) {
            databases.retain(|d| d.identifier != identifier);
        }
    }

    pub fn add_azure_vm(&self, vm: AzureVm) {
        self.inventory.lock().unwrap().azure_vms.push(vm);
    }

    pub fn add_aks(&self, cluster: AzureAksCluster) {
        self.inventory.lock().unwrap().aks.push(cluster);
    }

    pub fn add_azure_redis(&self, cache: AzureRedis) {
        self.inventory.lock().unwrap().azure_redis.push(cache);
    }

    pub fn add_gce(&self, instance: GceInstance) {
        self.inventory.lock().unwrap().gce.push(instance);
    }

    pub fn add_gke(&self, cluster: GkeCluster) {
        self.inventory.lock().unwrap().gke.push(cluster);
    }

    pub fn add_kube_service(&self, service: KubeService) {
        self.inventory.lock().unwrap().services.push(service);
    }

    /// Makes every call of `listing` fail until cleared.
    pub fn fail_listing(&self, listing: Listing, err: DiscoveryError) {
        self.inventory.lock().unwrap().errors.insert(listing, err);
    }

    pub fn clear_failure(&self, listing: Listing) {
        self.inventory.lock().unwrap().errors.remove(&listing);
    }

    /// Every listing call made so far, with the credentials it carried.
    pub fn calls(&self) -> Vec<(Listing, CloudCredentials)> {
        self.inventory.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, listing: Listing) -> usize {
        let inventory = self.inventory.lock().unwrap();
        inventory.calls.iter().filter(|(l, _)| *l == listing).count()
    }

    fn list<T, F>(
        &self,
        listing: Listing,
        creds: &CloudCredentials,
        token: Option<String>,
        select: F,
    ) -> DiscoveryResult<Page<T>>
    where
        T: Clone,
        F: FnOnce(&Inventory) -> Vec<T>,
    {
        let mut inventory = self.inventory.lock().unwrap();
        inventory.calls.push((listing, creds.clone()));
        if let Some(err) = inventory.errors.get(&listing) {
            return Err(err.clone());
        }
        let items = select(&inventory);
        Ok(page_of(items, self.page_size, token))
    }

    fn list_databases(
        &self,
        listing: Listing,
        creds: &CloudCredentials,
        region: &str,
        token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list(listing, creds, token, |inv| {
            inv.databases
                .get(&listing)
                .map(|dbs| dbs.iter().filter(|d| d.region == region).cloned().collect())
                .unwrap_or_default()
        })
    }
}

fn in_azure_scope(
    scope: &AzureScope,
    subscription: &str,
    resource_group: &str,
    region: &str,
) -> bool {
    scoped(&scope.subscription, subscription)
        && scoped(&scope.resource_group, resource_group)
        && scoped(&scope.region, region)
}

/// GCE zones (`us-central1-a`) sit inside regional locations (`us-central1`).
fn in_gcp_location(requested: &str, actual: &str) -> bool {
    scoped(requested, actual) || actual.starts_with(&format!("{requested}-"))
}

#[async_trait]
impl CloudClients for FakeCloudClients {
    async fn list_ec2_instances(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<Ec2Instance>> {
        self.list(Listing::Ec2, creds, page_token, |inv| {
            inv.ec2.iter().filter(|i| i.region == region).cloned().collect()
        })
    }

    async fn list_eks_clusters(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<EksCluster>> {
        self.list(Listing::Eks, creds, page_token, |inv| {
            inv.eks.iter().filter(|c| c.region == region).cloned().collect()
        })
    }

    async fn list_rds_databases(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list_databases(Listing::Rds, creds, region, page_token)
    }

    async fn list_redshift_clusters(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list_databases(Listing::Redshift, creds, region, page_token)
    }

    async fn list_elasticache_clusters(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list_databases(Listing::ElastiCache, creds, region, page_token)
    }

    async fn list_memorydb_clusters(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list_databases(Listing::MemoryDb, creds, region, page_token)
    }

    async fn list_opensearch_domains(
        &self,
        creds: &CloudCredentials,
        region: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AwsDatabase>> {
        self.list_databases(Listing::OpenSearch, creds, region, page_token)
    }

    async fn list_azure_vms(
        &self,
        creds: &CloudCredentials,
        scope: &AzureScope,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureVm>> {
        self.list(Listing::AzureVm, creds, page_token, |inv| {
            inv.azure_vms
                .iter()
                .filter(|vm| {
                    in_azure_scope(scope, &vm.subscription_id, &vm.resource_group, &vm.region)
                })
                .cloned()
                .collect()
        })
    }

    async fn list_aks_clusters(
        &self,
        creds: &CloudCredentials,
        scope: &AzureScope,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureAksCluster>> {
        self.list(Listing::Aks, creds, page_token, |inv| {
            inv.aks
                .iter()
                .filter(|c| in_azure_scope(scope, &c.subscription_id, &c.resource_group, &c.region))
                .cloned()
                .collect()
        })
    }

    async fn list_azure_redis(
        &self,
        creds: &CloudCredentials,
        scope: &AzureScope,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<AzureRedis>> {
        self.list(Listing::AzureRedis, creds, page_token, |inv| {
            inv.azure_redis
                .iter()
                .filter(|r| in_azure_scope(scope, &r.subscription_id, &r.resource_group, &r.region))
                .cloned()
                .collect()
        })
    }

    async fn list_gce_instances(
        &self,
        creds: &CloudCredentials,
        project_id: &str,
        location: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<GceInstance>> {
        self.list(Listing::Gce, creds, page_token, |inv| {
            inv.gce
                .iter()
                .filter(|i| i.project_id == project_id && in_gcp_location(location, &i.zone))
                .cloned()
                .collect()
        })
    }

    async fn list_gke_clusters(
        &self,
        creds: &CloudCredentials,
        project_id: &str,
        location: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<GkeCluster>> {
        self.list(Listing::Gke, creds, page_token, |inv| {
            inv.gke
                .iter()
                .filter(|c| c.project_id == project_id && in_gcp_location(location, &c.location))
                .cloned()
                .collect()
        })
    }

    async fn list_kube_services(
        &self,
        namespace: &str,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<KubeService>> {
        self.list(
            Listing::KubeServices,
            &CloudCredentials::default(),
            page_token,
            |inv| {
                inv.services
                    .iter()
                    .filter(|s| scoped(namespace, &s.namespace))
                    .cloned()
                    .collect()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyscout_fetchers::drain_pages;

    #[tokio::test]
    async fn test_pages_and_region_filter() {
        let clients = FakeCloudClients::new().with_page_size(2);
        for i in 0..5 {
            clients.add_ec2(Ec2Instance {
                instance_id: format!("i-{i}"),
                region: "us-east-1".to_string(),
                ..Default::default()
            });
        }
        clients.add_ec2(Ec2Instance {
            instance_id: "i-west".to_string(),
            region: "us-west-2".to_string(),
            ..Default::default()
        });

        let creds = CloudCredentials::default();
        let all = drain_pages(|token| clients.list_ec2_instances(&creds, "us-east-1", token))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(clients.call_count(Listing::Ec2), 3);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let clients = FakeCloudClients::new();
        clients.fail_listing(
            Listing::Redshift,
            DiscoveryError::PermissionDenied("redshift:DescribeClusters".to_string()),
        );
        let creds = CloudCredentials::default();
        assert!(clients.list_redshift_clusters(&creds, "us-east-1", None).await.is_err());

        clients.clear_failure(Listing::Redshift);
        assert!(clients.list_redshift_clusters(&creds, "us-east-1", None).await.is_ok());
    }

    #[test]
    fn test_gcp_location_matching() {
        assert!(in_gcp_location("*", "us-central1-a"));
        assert!(in_gcp_location("us-central1", "us-central1-a"));
        assert!(!in_gcp_location("us-central1", "europe-west1-b"));
    }
}
