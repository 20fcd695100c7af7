//! Shared harness for end-to-end discovery scenarios.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use skyscout::core::{AwsMatcher, DiscoveryConfig, LabelSelector, Matchers};
use skyscout::{Collaborators, EngineSettings, Server};
use skyscout_testing::{
    FakeCloudClients, FakeRemoteExecutor, InMemoryAccessPoint, ManualClock,
    RecordingAuditEmitter, RecordingUsageReporter,
};

/// One shared inventory and cloud, any number of engines.
pub struct Harness {
    pub access_point: Arc<InMemoryAccessPoint>,
    pub cloud: Arc<FakeCloudClients>,
    pub executor: Arc<FakeRemoteExecutor>,
    pub audit: Arc<RecordingAuditEmitter>,
    pub usage: Arc<RecordingUsageReporter>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            access_point: Arc::new(InMemoryAccessPoint::new()),
            cloud: Arc::new(FakeCloudClients::new()),
            executor: Arc::new(FakeRemoteExecutor::new()),
            audit: Arc::new(RecordingAuditEmitter::new()),
            usage: Arc::new(RecordingUsageReporter::new()),
            clock: Arc::new(ManualClock::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.access_point.clone(),
            self.cloud.clone(),
            self.executor.clone(),
        )
        .with_audit(self.audit.clone())
        .with_usage(self.usage.clone())
        .with_clock(self.clock.clone())
    }

    pub fn server(&self, settings: EngineSettings) -> Server {
        Server::new(settings, self.collaborators()).expect("valid engine settings")
    }

    /// Engine in `group` that only uses DiscoveryConfigs.
    pub async fn dynamic_server(&self, group: &str) -> Server {
        let server = self.server(EngineSettings::new(group));
        server.sync_configs().await.expect("configs load");
        server
    }

    pub fn put_config(&self, name: &str, group: &str, aws: Vec<AwsMatcher>) -> DiscoveryConfig {
        self.access_point.put_discovery_config(DiscoveryConfig::new(
            name,
            group,
            Matchers {
                aws,
                ..Default::default()
            },
        ))
    }
}

/// Settings with static AWS matchers and a short poll interval.
pub fn static_settings(group: &str, aws: Vec<AwsMatcher>) -> EngineSettings {
    EngineSettings::new(group)
        .with_matchers(Matchers {
            aws,
            ..Default::default()
        })
        .with_poll_interval(Duration::from_millis(50))
}

pub fn aws_matcher_in(region: &str, types: &[&str], tags: LabelSelector) -> AwsMatcher {
    AwsMatcher {
        types: types.iter().map(|t| t.to_string()).collect(),
        regions: vec![region.to_string()],
        tags,
        ..Default::default()
    }
}

pub fn with_integration(mut matcher: AwsMatcher, integration: &str) -> AwsMatcher {
    matcher.integration = Some(integration.to_string());
    matcher
}
