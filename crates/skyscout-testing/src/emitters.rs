//! Emitters that remember what they were given.

use async_trait::async_trait;
use std::sync::Mutex;

use skyscout_core::{
    AuditEmitter, AuditEvent, DiscoveryResult, InstallRunEvent, ResourceCreateEvent, UsageEvent,
    UsageReporter,
};

#[derive(Debug, Default)]
pub struct RecordingAuditEmitter {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn install_runs(&self) -> Vec<InstallRunEvent> {
        self.events()
            .into_iter()
            .map(|event| match event {
                AuditEvent::InstallRun(run) => run,
            })
            .collect()
    }
}

#[async_trait]
impl AuditEmitter for RecordingAuditEmitter {
    async fn emit_audit_event(&self, event: AuditEvent) -> DiscoveryResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingUsageReporter {
    events: Mutex<Vec<UsageEvent>>,
}

impl RecordingUsageReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn resource_creates(&self) -> Vec<ResourceCreateEvent> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UsageEvent::ResourceCreate(create) => Some(create),
                UsageEvent::DiscoveryFetch(_) => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, UsageEvent::DiscoveryFetch(_)))
            .count()
    }
}

#[async_trait]
impl UsageReporter for RecordingUsageReporter {
    async fn submit_usage_event(&self, event: UsageEvent) -> DiscoveryResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
