//! Usage events: one per newly enrolled resource, one per fetching cycle.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use skyscout_core::labels::ORIGIN_CLOUD;
use skyscout_core::{
    DiscoveredResource, DiscoveryFetchEvent, ResourceCreateEvent, ResourceSpec, UsageEvent,
    UsageReporter,
};

/// Reports usage, deduplicating resource creations for the tracker's lifetime.
pub struct UsageTracker {
    reporter: Arc<dyn UsageReporter>,
    reported: Mutex<HashSet<String>>,
}

/// Key a created resource is deduplicated by.
fn resource_key(resource: &DiscoveredResource) -> String {
    match resource.resource.instance_identity() {
        Some(identity) => format!("node/{}", identity.instance_key()),
        None => format!("{}/{}", resource.kind(), resource.name()),
    }
}

impl UsageTracker {
    pub fn new(reporter: Arc<dyn UsageReporter>) -> Self {
        Self {
            reporter,
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Submits one event per resource not reported before. Returns how many
    /// were submitted.
    pub async fn resources_created<'a>(
        &self,
        created: impl IntoIterator<Item = &'a DiscoveredResource>,
    ) -> usize {
        let fresh: Vec<ResourceCreateEvent> = {
            let mut reported = self.reported.lock().await;
            created
                .into_iter()
                .filter(|resource| reported.insert(resource_key(resource)))
                .map(|resource| ResourceCreateEvent {
                    resource_type: resource.kind().as_str().to_string(),
                    resource_origin: ORIGIN_CLOUD.to_string(),
                    cloud_provider: resource.cloud.provider_name().to_string(),
                    database_protocol: match &resource.resource.spec {
                        ResourceSpec::Database(db) => Some(db.protocol.clone()),
                        _ => None,
                    },
                })
                .collect()
        };

        let count = fresh.len();
        for event in fresh {
            if let Err(err) = self
                .reporter
                .submit_usage_event(UsageEvent::ResourceCreate(event))
                .await
            {
                warn!(error = %err, "Failed to submit resource usage event");
            }
        }
        count
    }

    /// Reports a cycle that ran fetchers for the given (cloud, type) pairs.
    /// Nothing is sent when no fetcher ran.
    pub async fn fetch_ran(&self, fetched: &BTreeSet<(String, String)>) {
        if fetched.is_empty() {
            return;
        }
        let cloud_providers: BTreeSet<String> = fetched.iter().map(|(c, _)| c.clone()).collect();
        let resource_types: BTreeSet<String> = fetched.iter().map(|(_, t)| t.clone()).collect();
        let event = DiscoveryFetchEvent {
            cloud_providers: cloud_providers.into_iter().collect(),
            resource_types: resource_types.into_iter().collect(),
        };
        if let Err(err) = self
            .reporter
            .submit_usage_event(UsageEvent::DiscoveryFetch(event))
            .await
        {
            warn!(error = %err, "Failed to submit discovery fetch usage event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyscout_core::resource::SummaryKind;
    use skyscout_core::{AppSpec, Cloud, Resource};
    use skyscout_testing::RecordingUsageReporter;

    fn discovered(name: &str) -> DiscoveredResource {
        DiscoveredResource {
            resource: Resource::new(
                name,
                ResourceSpec::App(AppSpec {
                    uri: "http://app".to_string(),
                    public_addr: String::new(),
                }),
            ),
            summary: SummaryKind::KubeApp,
            matcher_type: "app",
            cloud: Cloud::Kubernetes,
        }
    }

    #[tokio::test]
    async fn test_creations_are_reported_once() {
        let reporter = Arc::new(RecordingUsageReporter::new());
        let tracker = UsageTracker::new(reporter.clone());

        let first = [discovered("a"), discovered("b"), discovered("a")];
        assert_eq!(tracker.resources_created(&first).await, 2);
        assert_eq!(reporter.resource_creates().len(), 2);

        let second = [discovered("a"), discovered("b"), discovered("c")];
        assert_eq!(tracker.resources_created(&second).await, 1);
        assert_eq!(reporter.resource_creates().len(), 3);
        assert_eq!(reporter.resource_creates()[0].resource_type, "app");
    }

    #[tokio::test]
    async fn test_fetch_event_only_when_fetchers_ran() {
        let reporter = Arc::new(RecordingUsageReporter::new());
        let tracker = UsageTracker::new(reporter.clone());

        tracker.fetch_ran(&BTreeSet::new()).await;
        assert_eq!(reporter.fetch_count(), 0);

        let ran: BTreeSet<(String, String)> = [
            ("AWS".to_string(), "ec2".to_string()),
            ("AWS".to_string(), "rds".to_string()),
        ]
        .into_iter()
        .collect();
        tracker.fetch_ran(&ran).await;
        assert_eq!(reporter.fetch_count(), 1);
    }
}
