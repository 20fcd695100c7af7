//! Matchers → fetchers.
//!
//! One fetcher is built per (matcher, resource type, scope). A matcher entry
//! that cannot be turned into a fetcher is skipped with a warning; the rest of
//! the set stays usable.

use std::sync::Arc;
use tracing::warn;

use skyscout_core::labels::WILDCARD;
use skyscout_core::{
    AwsMatcher, AzureMatcher, Cloud, DiscoveryError, GcpMatcher, KubernetesMatcher, Matchers,
};

use crate::clients::{AzureScope, CloudClients, CloudCredentials};
use crate::fetcher::{CloudFetcher, FetchScope, ResourceFetcher};
use crate::kind::FetcherKind;

/// Inputs shared by every fetcher built from one matcher set.
#[derive(Debug, Clone, Default)]
pub struct FetcherOptions {
    /// DiscoveryConfig the matchers came from; `None` for static matchers.
    pub discovery_config: Option<String>,
    /// Cluster the engine runs in, required for Kubernetes app discovery.
    pub kube_cluster_name: Option<String>,
}

/// Fetchers built from a matcher set, plus what was skipped and why.
#[derive(Debug, Default)]
pub struct FetcherSet {
    pub fetchers: Vec<Arc<dyn ResourceFetcher>>,
    pub skipped: Vec<DiscoveryError>,
}

impl FetcherSet {
    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    fn push(&mut self, fetcher: CloudFetcher) {
        self.fetchers.push(Arc::new(fetcher));
    }

    fn skip(&mut self, kind: Option<FetcherKind>, err: DiscoveryError) {
        warn!(
            fetcher = kind.map(|k| k.to_string()).unwrap_or_default(),
            error = %err,
            "Skipping fetcher that cannot be constructed"
        );
        self.skipped.push(err);
    }
}

/// Builds every fetcher implied by `matchers`.
pub fn build_fetchers(
    matchers: &Matchers,
    options: &FetcherOptions,
    clients: Arc<dyn CloudClients>,
) -> FetcherSet {
    let mut set = FetcherSet::default();
    for matcher in &matchers.aws {
        build_aws(&mut set, matcher, options, &clients);
    }
    for matcher in &matchers.azure {
        build_azure(&mut set, matcher, options, &clients);
    }
    for matcher in &matchers.gcp {
        build_gcp(&mut set, matcher, options, &clients);
    }
    for matcher in &matchers.kubernetes {
        build_kube(&mut set, matcher, options, &clients);
    }
    set
}

fn resolve_kinds(set: &mut FetcherSet, cloud: Cloud, types: &[String]) -> Vec<FetcherKind> {
    let mut kinds = Vec::new();
    for t in types {
        match FetcherKind::from_matcher_type(cloud, t) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => set.skip(
                None,
                DiscoveryError::BadParameter(format!("unsupported {cloud} resource type {t:?}")),
            ),
        }
    }
    kinds
}

fn integration(value: &Option<String>) -> Option<String> {
    value.clone().filter(|i| !i.is_empty())
}

fn build_aws(
    set: &mut FetcherSet,
    matcher: &AwsMatcher,
    options: &FetcherOptions,
    clients: &Arc<dyn CloudClients>,
) {
    let credentials = CloudCredentials {
        integration: integration(&matcher.integration),
        assume_role: matcher.assume_role.clone(),
    };
    for kind in resolve_kinds(set, Cloud::Aws, &matcher.types) {
        let regions: Vec<&String> = matcher
            .regions
            .iter()
            .filter(|r| !r.is_empty() && r.as_str() != WILDCARD)
            .collect();
        if regions.is_empty() {
            set.skip(
                Some(kind),
                DiscoveryError::BadParameter(format!(
                    "{kind} matcher requires at least one concrete region"
                )),
            );
            continue;
        }
        for region in regions {
            let fetcher = CloudFetcher::new(
                kind,
                FetchScope::Aws {
                    region: region.clone(),
                },
                matcher.tags.clone(),
                credentials.clone(),
                clients.clone(),
            )
            .with_discovery_config(options.discovery_config.clone());
            let fetcher = if kind.is_compute() {
                fetcher.with_install(matcher.install.clone(), matcher.ssm_document.clone())
            } else {
                fetcher
            };
            set.push(fetcher);
        }
    }
}

fn non_empty_or_wildcard(values: &[String]) -> Vec<String> {
    let values: Vec<String> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
    if values.is_empty() {
        vec![WILDCARD.to_string()]
    } else {
        values
    }
}

fn build_azure(
    set: &mut FetcherSet,
    matcher: &AzureMatcher,
    options: &FetcherOptions,
    clients: &Arc<dyn CloudClients>,
) {
    let credentials = CloudCredentials {
        integration: integration(&matcher.integration),
        assume_role: None,
    };
    let subscriptions = non_empty_or_wildcard(&matcher.subscriptions);
    let groups = non_empty_or_wildcard(&matcher.resource_groups);
    let regions = non_empty_or_wildcard(&matcher.regions);

    for kind in resolve_kinds(set, Cloud::Azure, &matcher.types) {
        for subscription in &subscriptions {
            for resource_group in &groups {
                for region in &regions {
                    let scope = FetchScope::Azure(AzureScope {
                        subscription: subscription.clone(),
                        resource_group: resource_group.clone(),
                        region: region.clone(),
                    });
                    let fetcher = CloudFetcher::new(
                        kind,
                        scope,
                        matcher.resource_tags.clone(),
                        credentials.clone(),
                        clients.clone(),
                    )
                    .with_discovery_config(options.discovery_config.clone());
                    let fetcher = if kind.is_compute() {
                        fetcher.with_install(matcher.install.clone(), None)
                    } else {
                        fetcher
                    };
                    set.push(fetcher);
                }
            }
        }
    }
}

fn build_gcp(
    set: &mut FetcherSet,
    matcher: &GcpMatcher,
    options: &FetcherOptions,
    clients: &Arc<dyn CloudClients>,
) {
    let credentials = CloudCredentials {
        integration: integration(&matcher.integration),
        assume_role: None,
    };
    let locations = non_empty_or_wildcard(&matcher.locations);

    for kind in resolve_kinds(set, Cloud::Gcp, &matcher.types) {
        let projects: Vec<&String> = matcher.project_ids.iter().filter(|p| !p.is_empty()).collect();
        if projects.is_empty() {
            set.skip(
                Some(kind),
                DiscoveryError::BadParameter(format!("{kind} matcher requires project IDs")),
            );
            continue;
        }
        for project_id in projects {
            for location in &locations {
                let fetcher = CloudFetcher::new(
                    kind,
                    FetchScope::Gcp {
                        project_id: project_id.clone(),
                        location: location.clone(),
                    },
                    matcher.labels.clone(),
                    credentials.clone(),
                    clients.clone(),
                )
                .with_discovery_config(options.discovery_config.clone());
                let fetcher = if kind.is_compute() {
                    fetcher.with_install(matcher.install.clone(), None)
                } else {
                    fetcher
                };
                set.push(fetcher);
            }
        }
    }
}

fn build_kube(
    set: &mut FetcherSet,
    matcher: &KubernetesMatcher,
    options: &FetcherOptions,
    clients: &Arc<dyn CloudClients>,
) {
    for kind in resolve_kinds(set, Cloud::Kubernetes, &matcher.types) {
        let Some(cluster) = options.kube_cluster_name.clone().filter(|c| !c.is_empty()) else {
            set.skip(
                Some(kind),
                DiscoveryError::BadParameter(
                    "kubernetes app discovery requires a cluster name".to_string(),
                ),
            );
            continue;
        };
        for namespace in non_empty_or_wildcard(&matcher.namespaces) {
            let fetcher = CloudFetcher::new(
                kind,
                FetchScope::Kube {
                    cluster: cluster.clone(),
                    namespace,
                },
                matcher.labels.clone(),
                CloudCredentials::default(),
                clients.clone(),
            )
            .with_discovery_config(options.discovery_config.clone());
            set.push(fetcher);
        }
    }
}
