//! Cloud record → inventory resource conversion.

use skyscout_core::labels;
use skyscout_core::naming::{qualified_name, sanitize};
use skyscout_core::{
    AppSpec, AssumeRole, DatabaseCloudMeta, DatabaseSpec, DiscoveredResource, InstanceIdentity,
    KubeClusterSpec, Labels, NodeSpec, Resource, ResourceSpec,
};

use crate::kind::FetcherKind;
use crate::records::{
    AwsDatabase, AzureAksCluster, AzureRedis, AzureVm, Ec2Instance, EksCluster, GceInstance,
    GkeCluster, KubeService, Tags,
};

/// Provenance stamped on every resource a fetcher returns.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stamp {
    pub integration: Option<String>,
    pub discovery_config: Option<String>,
    pub assume_role: Option<AssumeRole>,
}

impl Stamp {
    fn labels(&self, kind: FetcherKind, region: &str, native: &Tags) -> Labels {
        let cloud = kind.cloud();
        let mut out: Labels = native
            .iter()
            .map(|(k, v)| (format!("{}/{}", cloud.as_str(), k), v.clone()))
            .collect();
        out.insert(labels::CLOUD.to_string(), cloud.provider_name().to_string());
        out.insert(
            labels::DISCOVERY_TYPE.to_string(),
            kind.matcher_type().to_string(),
        );
        if !region.is_empty() {
            out.insert(labels::REGION.to_string(), region.to_string());
        }
        if let Some(integration) = &self.integration {
            out.insert(labels::INTEGRATION.to_string(), integration.clone());
        }
        if let Some(config) = &self.discovery_config {
            out.insert(labels::DISCOVERY_CONFIG.to_string(), config.clone());
        }
        out
    }

    fn wrap(
        &self,
        kind: FetcherKind,
        mut resource: Resource,
        region: &str,
        native: &Tags,
    ) -> DiscoveredResource {
        let stamped = self.labels(kind, region, native);
        resource.metadata.labels.extend(stamped);
        DiscoveredResource {
            resource,
            summary: kind.summary(),
            matcher_type: kind.matcher_type(),
            cloud: kind.cloud(),
        }
    }

    fn node(
        &self,
        kind: FetcherKind,
        identity: InstanceIdentity,
        hostname: &str,
        addr: &str,
        region: &str,
        native: &Tags,
    ) -> DiscoveredResource {
        let mut resource = Resource::new(
            identity.node_name(),
            ResourceSpec::Node(NodeSpec {
                hostname: hostname.to_string(),
                addr: addr.to_string(),
                identity: identity.clone(),
            }),
        );
        identity.apply_labels(&mut resource.metadata.labels);
        self.wrap(kind, resource, region, native)
    }

    pub fn ec2(&self, instance: &Ec2Instance) -> DiscoveredResource {
        let identity = InstanceIdentity::Aws {
            account_id: instance.account_id.clone(),
            instance_id: instance.instance_id.clone(),
        };
        let hostname = if instance.private_dns.is_empty() {
            &instance.instance_id
        } else {
            &instance.private_dns
        };
        self.node(
            FetcherKind::AwsEc2,
            identity,
            hostname,
            &instance.private_ip,
            &instance.region,
            &instance.tags,
        )
    }

    pub fn azure_vm(&self, vm: &AzureVm) -> DiscoveredResource {
        let identity = InstanceIdentity::Azure {
            subscription_id: vm.subscription_id.clone(),
            vm_id: vm.vm_id.clone(),
        };
        self.node(
            FetcherKind::AzureVm,
            identity,
            &vm.name,
            &vm.private_ip,
            &vm.region,
            &vm.tags,
        )
    }

    pub fn gce(&self, instance: &GceInstance) -> DiscoveredResource {
        let identity = InstanceIdentity::Gcp {
            project_id: instance.project_id.clone(),
            zone: instance.zone.clone(),
            name: instance.name.clone(),
        };
        self.node(
            FetcherKind::GcpGce,
            identity,
            &instance.name,
            &instance.internal_ip,
            &instance.zone,
            &instance.labels,
        )
    }

    pub fn aws_database(&self, kind: FetcherKind, db: &AwsDatabase) -> DiscoveredResource {
        let name = qualified_name(
            &db.identifier,
            &[kind.matcher_type(), &db.region, &db.account_id],
        );
        let spec = DatabaseSpec {
            protocol: protocol_for(kind, &db.engine).to_string(),
            uri: format!("{}:{}", db.endpoint, db.port),
            cloud: kind.cloud(),
            meta: DatabaseCloudMeta {
                account: db.account_id.clone(),
                region: db.region.clone(),
                native_name: db.identifier.clone(),
                engine: db.engine.clone(),
                is_cluster: db.is_cluster,
                iam_auth_enabled: db.iam_auth_enabled,
                assume_role: self.assume_role.clone(),
            },
        };
        let resource = Resource::new(name, ResourceSpec::Database(spec))
            .with_label(labels::AWS_ACCOUNT_ID, db.account_id.clone());
        self.wrap(kind, resource, &db.region, &db.tags)
    }

    pub fn azure_redis(&self, cache: &AzureRedis) -> DiscoveredResource {
        let kind = FetcherKind::AzureRedis;
        let name = qualified_name(
            &cache.name,
            &[kind.matcher_type(), &cache.region, &cache.subscription_id],
        );
        let spec = DatabaseSpec {
            protocol: "redis".to_string(),
            uri: format!("{}:{}", cache.hostname, cache.port),
            cloud: kind.cloud(),
            meta: DatabaseCloudMeta {
                account: cache.subscription_id.clone(),
                region: cache.region.clone(),
                native_name: cache.name.clone(),
                engine: "redis".to_string(),
                ..Default::default()
            },
        };
        let resource = Resource::new(name, ResourceSpec::Database(spec))
            .with_label(labels::AZURE_SUBSCRIPTION_ID, cache.subscription_id.clone());
        self.wrap(kind, resource, &cache.region, &cache.tags)
    }

    fn kube_cluster(
        &self,
        kind: FetcherKind,
        native_name: &str,
        account: &str,
        region: &str,
        native: &Tags,
    ) -> DiscoveredResource {
        let name = qualified_name(native_name, &[kind.matcher_type(), region, account]);
        let spec = KubeClusterSpec {
            cloud: kind.cloud(),
            account: account.to_string(),
            region: region.to_string(),
            cluster_name: native_name.to_string(),
        };
        self.wrap(
            kind,
            Resource::new(name, ResourceSpec::KubeCluster(spec)),
            region,
            native,
        )
    }

    pub fn eks(&self, cluster: &EksCluster) -> DiscoveredResource {
        self.kube_cluster(
            FetcherKind::AwsEks,
            &cluster.name,
            &cluster.account_id,
            &cluster.region,
            &cluster.tags,
        )
    }

    pub fn aks(&self, cluster: &AzureAksCluster) -> DiscoveredResource {
        self.kube_cluster(
            FetcherKind::AzureAks,
            &cluster.name,
            &cluster.subscription_id,
            &cluster.region,
            &cluster.tags,
        )
    }

    pub fn gke(&self, cluster: &GkeCluster) -> DiscoveredResource {
        self.kube_cluster(
            FetcherKind::GcpGke,
            &cluster.name,
            &cluster.project_id,
            &cluster.location,
            &cluster.labels,
        )
    }

    /// Services without a port cannot be proxied and yield nothing.
    pub fn kube_app(&self, cluster: &str, service: &KubeService) -> Option<DiscoveredResource> {
        let port = service.port?;
        let scheme = match service.protocol.as_str() {
            "https" => "https",
            "tcp" => "tcp",
            _ => "http",
        };
        let uri = format!(
            "{scheme}://{}.{}.svc.cluster.local:{port}",
            service.name, service.namespace
        );
        let name = qualified_name(&service.name, &[&service.namespace, &sanitize(cluster)]);
        let resource = Resource::new(
            name,
            ResourceSpec::App(AppSpec {
                uri,
                public_addr: String::new(),
            }),
        );
        Some(self.wrap(FetcherKind::KubeApp, resource, "", &service.labels))
    }
}

/// Access protocol implied by a database engine.
pub fn protocol_for(kind: FetcherKind, engine: &str) -> &'static str {
    match kind {
        FetcherKind::AwsRedshift => "postgres",
        FetcherKind::AwsElastiCache | FetcherKind::AwsMemoryDb | FetcherKind::AzureRedis => "redis",
        FetcherKind::AwsOpenSearch => "opensearch",
        _ => match engine {
            "postgres" | "aurora-postgresql" => "postgres",
            "mysql" | "mariadb" | "aurora-mysql" | "aurora" => "mysql",
            e if e.starts_with("sqlserver") => "sqlserver",
            e if e.starts_with("oracle") => "oracle",
            _ => "postgres",
        },
    }
}

/// Whether a provider-reported compute state counts as running.
pub fn is_running(kind: FetcherKind, state: &str) -> bool {
    match kind {
        FetcherKind::AwsEc2 => state.eq_ignore_ascii_case("running"),
        FetcherKind::AzureVm => {
            let state = state.strip_prefix("PowerState/").unwrap_or(state);
            state.eq_ignore_ascii_case("running")
        }
        FetcherKind::GcpGce => state.eq_ignore_ascii_case("RUNNING"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FetcherKind::AwsRds, "aurora-postgresql", "postgres")]
    #[case(FetcherKind::AwsRds, "mariadb", "mysql")]
    #[case(FetcherKind::AwsRds, "sqlserver-ee", "sqlserver")]
    #[case(FetcherKind::AwsRedshift, "redshift", "postgres")]
    #[case(FetcherKind::AwsMemoryDb, "redis", "redis")]
    fn test_protocol_for(#[case] kind: FetcherKind, #[case] engine: &str, #[case] expected: &str) {
        assert_eq!(protocol_for(kind, engine), expected);
    }

    #[rstest]
    #[case(FetcherKind::AwsEc2, "running", true)]
    #[case(FetcherKind::AwsEc2, "stopped", false)]
    #[case(FetcherKind::AzureVm, "PowerState/running", true)]
    #[case(FetcherKind::AzureVm, "deallocated", false)]
    #[case(FetcherKind::GcpGce, "TERMINATED", false)]
    fn test_is_running(#[case] kind: FetcherKind, #[case] state: &str, #[case] expected: bool) {
        assert_eq!(is_running(kind, state), expected);
    }

    #[test]
    fn test_ec2_labels_and_name() {
        let stamp = Stamp {
            integration: Some("my-integration".to_string()),
            discovery_config: Some("dc001".to_string()),
            assume_role: None,
        };
        let mut tags = Tags::new();
        tags.insert("env".to_string(), "dev".to_string());
        let discovered = stamp.ec2(&Ec2Instance {
            instance_id: "i-123".to_string(),
            account_id: "owner".to_string(),
            region: "eu-west-2".to_string(),
            state: "running".to_string(),
            tags,
            ..Default::default()
        });

        let stamped = discovered.resource.labels();
        assert_eq!(discovered.name(), "aws-owner-i-123");
        assert_eq!(stamped.get("aws/env").map(String::as_str), Some("dev"));
        assert_eq!(stamped.get(labels::INTEGRATION).map(String::as_str), Some("my-integration"));
        assert_eq!(stamped.get(labels::DISCOVERY_CONFIG).map(String::as_str), Some("dc001"));
        assert_eq!(stamped.get(labels::AWS_INSTANCE_ID).map(String::as_str), Some("i-123"));
        assert_eq!(stamped.get(labels::DISCOVERY_TYPE).map(String::as_str), Some("ec2"));
    }

    #[test]
    fn test_kube_service_without_port_is_skipped() {
        let service = KubeService {
            name: "headless".to_string(),
            namespace: "default".to_string(),
            port: None,
            ..Default::default()
        };
        assert!(Stamp::default().kube_app("cluster", &service).is_none());
    }
}
