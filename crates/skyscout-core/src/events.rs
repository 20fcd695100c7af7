//! Audit and usage events produced for external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryResult;

pub const INSTALL_RUN_SUCCESS: &str = "TDS00I";
pub const INSTALL_RUN_FAILURE: &str = "TDS00W";

/// Outcome of one remote install command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRunEvent {
    /// `INSTALL_RUN_SUCCESS` or `INSTALL_RUN_FAILURE`.
    pub code: String,
    pub command_id: String,
    pub account_id: String,
    pub instance_id: String,
    pub region: String,
    pub exit_code: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub invocation_url: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    InstallRun(InstallRunEvent),
}

/// A newly enrolled resource, reported once per resource key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCreateEvent {
    /// `node`, `db`, `kube_cluster` or `app`.
    pub resource_type: String,
    pub resource_origin: String,
    pub cloud_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_protocol: Option<String>,
}

/// One discovery cycle that ran at least one fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFetchEvent {
    pub cloud_providers: Vec<String>,
    pub resource_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UsageEvent {
    ResourceCreate(ResourceCreateEvent),
    DiscoveryFetch(DiscoveryFetchEvent),
}

#[async_trait]
pub trait AuditEmitter: Send + Sync {
    async fn emit_audit_event(&self, event: AuditEvent) -> DiscoveryResult<()>;
}

#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn submit_usage_event(&self, event: UsageEvent) -> DiscoveryResult<()>;
}

/// Emitter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEmitter;

#[async_trait]
impl AuditEmitter for DiscardEmitter {
    async fn emit_audit_event(&self, _event: AuditEvent) -> DiscoveryResult<()> {
        Ok(())
    }
}

#[async_trait]
impl UsageReporter for DiscardEmitter {
    async fn submit_usage_event(&self, _event: UsageEvent) -> DiscoveryResult<()> {
        Ok(())
    }
}
