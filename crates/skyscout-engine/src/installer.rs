//! Agent installation on newly registered compute instances.
//!
//! Instances are installed concurrently, bounded by a semaphore, each under
//! its own timeout. One instance failing never affects the others; the
//! report carries a result per instance.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skyscout_core::events::{INSTALL_RUN_FAILURE, INSTALL_RUN_SUCCESS};
use skyscout_core::executor::STATUS_FAILED;
use skyscout_core::{
    AssumeRole, AuditEmitter, AuditEvent, Clock, DiscoveryError, InstallOutcome, InstallParams,
    InstallRequest, InstallRunEvent, InstanceIdentity, RemoteExecutor,
};
use skyscout_observability::DiscoveryMetrics;

/// One instance to install, with everything needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// Inventory node name.
    pub node_name: String,
    pub identity: InstanceIdentity,
    pub region: String,
    pub integration: Option<String>,
    pub assume_role: Option<AssumeRole>,
    pub params: InstallParams,
    pub document: Option<String>,
    pub discovery_config: Option<String>,
}

impl InstallTarget {
    pub fn instance_key(&self) -> String {
        self.identity.instance_key()
    }

    fn request(&self) -> InstallRequest {
        InstallRequest {
            identity: self.identity.clone(),
            region: self.region.clone(),
            integration: self.integration.clone(),
            assume_role: self.assume_role.clone(),
            params: self.params.clone(),
            document: self.document.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Succeeded(InstallOutcome),
    Failed {
        /// Present when the command ran and reported a failure.
        outcome: Option<InstallOutcome>,
        error: String,
    },
    /// Already attempted earlier in this cycle.
    Skipped,
    /// The cycle was cancelled before the command was dispatched.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    pub target: InstallTarget,
    pub status: InstallStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub entries: Vec<InstallEntry>,
}

impl InstallReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &InstallEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, InstallStatus::Succeeded(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &InstallEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, InstallStatus::Failed { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Installer {
    executor: Arc<dyn RemoteExecutor>,
    audit: Arc<dyn AuditEmitter>,
    clock: Arc<dyn Clock>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    attempted: Mutex<HashSet<String>>,
    metrics: Option<DiscoveryMetrics>,
}

impl Installer {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        audit: Arc<dyn AuditEmitter>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            audit,
            clock,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            attempted: Mutex::new(HashSet::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<DiscoveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Forgets the instances attempted during the previous cycle.
    pub async fn begin_cycle(&self) {
        self.attempted.lock().await.clear();
    }

    /// Installs every target not yet attempted this cycle.
    pub async fn run(
        &self,
        targets: Vec<InstallTarget>,
        cancel: &CancellationToken,
    ) -> InstallReport {
        let mut fresh = Vec::with_capacity(targets.len());
        let mut entries = Vec::new();
        {
            let mut attempted = self.attempted.lock().await;
            for target in targets {
                if attempted.insert(target.instance_key()) {
                    fresh.push(target);
                } else {
                    debug!(
                        instance = %target.instance_key(),
                        "Install already attempted this cycle"
                    );
                    entries.push(InstallEntry {
                        target,
                        status: InstallStatus::Skipped,
                    });
                }
            }
        }

        let results = join_all(fresh.iter().map(|target| self.install_one(target, cancel))).await;
        entries.extend(
            fresh
                .into_iter()
                .zip(results)
                .map(|(target, status)| InstallEntry { target, status }),
        );
        InstallReport { entries }
    }

    async fn install_one(
        &self,
        target: &InstallTarget,
        cancel: &CancellationToken,
    ) -> InstallStatus {
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return InstallStatus::Cancelled,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return InstallStatus::Cancelled,
            },
        };
        if cancel.is_cancelled() {
            return InstallStatus::Cancelled;
        }

        let install = self.executor.run_install(target.request());
        let result = tokio::select! {
            _ = cancel.cancelled() => return InstallStatus::Cancelled,
            result = tokio::time::timeout(self.timeout, install) => {
                result.map_err(|_| DiscoveryError::Timeout(self.timeout)).and_then(|r| r)
            }
        };

        let status = match result {
            Ok(outcome) if outcome.succeeded() => {
                info!(
                    instance = %target.instance_key(),
                    node = %target.node_name,
                    command_id = %outcome.command_id,
                    "Installed agent on instance"
                );
                InstallStatus::Succeeded(outcome)
            }
            Ok(outcome) => {
                warn!(
                    instance = %target.instance_key(),
                    exit_code = outcome.exit_code,
                    status = %outcome.status,
                    "Agent installation failed"
                );
                let error = format!(
                    "installer exited with code {} ({})",
                    outcome.exit_code, outcome.status
                );
                InstallStatus::Failed {
                    outcome: Some(outcome),
                    error,
                }
            }
            Err(err) => {
                warn!(
                    instance = %target.instance_key(),
                    error = %err,
                    "Agent installation could not be run"
                );
                InstallStatus::Failed {
                    outcome: None,
                    error: err.to_string(),
                }
            }
        };

        self.audit_outcome(target, &status).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_install(matches!(status, InstallStatus::Succeeded(_)));
        }
        status
    }

    async fn audit_outcome(&self, target: &InstallTarget, status: &InstallStatus) {
        let (code, outcome) = match status {
            InstallStatus::Succeeded(outcome) => (INSTALL_RUN_SUCCESS, Some(outcome)),
            InstallStatus::Failed { outcome, .. } => (INSTALL_RUN_FAILURE, outcome.as_ref()),
            InstallStatus::Skipped | InstallStatus::Cancelled => return,
        };
        let (account_id, instance_id) = audit_ids(&target.identity);
        let event = InstallRunEvent {
            code: code.to_string(),
            command_id: outcome.map(|o| o.command_id.clone()).unwrap_or_default(),
            account_id,
            instance_id,
            region: target.region.clone(),
            exit_code: outcome.map_or(-1, |o| o.exit_code),
            status: outcome
                .map(|o| o.status.clone())
                .unwrap_or_else(|| STATUS_FAILED.to_string()),
            invocation_url: outcome.map(|o| o.invocation_url.clone()).unwrap_or_default(),
            time: self.clock.now(),
        };
        if let Err(err) = self.audit.emit_audit_event(AuditEvent::InstallRun(event)).await {
            warn!(
                instance = %target.instance_key(),
                error = %err,
                "Failed to emit install audit event"
            );
        }
    }
}

/// Account-like and instance-like identifiers of an instance.
fn audit_ids(identity: &InstanceIdentity) -> (String, String) {
    match identity {
        InstanceIdentity::Aws {
            account_id,
            instance_id,
        } => (account_id.clone(), instance_id.clone()),
        InstanceIdentity::Azure {
            subscription_id,
            vm_id,
        } => (subscription_id.clone(), vm_id.clone()),
        InstanceIdentity::Gcp {
            project_id,
            zone,
            name,
        } => (project_id.clone(), format!("{zone}/{name}")),
    }
}
