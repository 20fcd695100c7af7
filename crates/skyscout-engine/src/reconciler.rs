//! Ownership-aware reconciliation of fetched resources against the inventory.
//!
//! For each fetched resource, looked up by its deterministic name:
//!
//! ```text
//! not found ──────────────▶ create ──AlreadyExists──▶ re-read, apply rules below
//! Owned ──────────────────▶ update when labels/spec differ, otherwise no-op
//! Claimable ──────────────▶ update (stamps the discovery group)
//! Foreign ────────────────▶ OwnershipConflict, left untouched
//! ```
//!
//! Owned resources absent from the fetch are deleted. Work is split in
//! fixed-size chunks; cancellation is only observed between chunks, so a
//! chunk is either fully applied or not started.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skyscout_core::labels::ORIGIN_CLOUD;
use skyscout_core::{
    AccessPoint, DiscoveryError, DiscoveryResult, InstanceIdentity, Resource, ResourceKind,
    list_all_resources,
};
use skyscout_observability::DiscoveryMetrics;

use crate::ownership::{self, Ownership};

/// What happened to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Claimed,
    Updated,
    Unchanged,
    /// A compute instance already registered under another name by its own
    /// agent.
    AlreadyEnrolled,
    Failed(DiscoveryError),
}

impl ReconcileAction {
    /// Whether the resource is registered in the inventory after this cycle.
    pub fn is_registered(&self) -> bool {
        !matches!(self, ReconcileAction::Failed(_))
    }

    fn metric_label(&self) -> &'static str {
        match self {
            ReconcileAction::Created => "create",
            ReconcileAction::Claimed | ReconcileAction::Updated => "update",
            ReconcileAction::Unchanged | ReconcileAction::AlreadyEnrolled => "unchanged",
            ReconcileAction::Failed(_) => "error",
        }
    }
}

/// Outcome of reconciling one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub kind: ResourceKind,
    pub outcomes: BTreeMap<String, ReconcileAction>,
    pub deleted: Vec<String>,
    pub delete_errors: Vec<(String, DiscoveryError)>,
    /// Deletions were not attempted this cycle.
    pub deletions_skipped: bool,
    /// Cancellation stopped processing before every chunk ran.
    pub cancelled: bool,
    /// Chunks applied.
    pub chunks: usize,
}

impl ReconcileReport {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            outcomes: BTreeMap::new(),
            deleted: Vec::new(),
            delete_errors: Vec::new(),
            deletions_skipped: false,
            cancelled: false,
            chunks: 0,
        }
    }

    pub fn outcome(&self, name: &str) -> Option<&ReconcileAction> {
        self.outcomes.get(name)
    }

    /// Names created by this cycle.
    pub fn created(&self) -> Vec<&str> {
        self.names_where(|a| *a == ReconcileAction::Created)
    }

    pub fn errors(&self) -> Vec<(&str, &DiscoveryError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, action)| match action {
                ReconcileAction::Failed(err) => Some((name.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&ReconcileAction) -> bool) -> usize {
        self.outcomes.values().filter(|a| pred(a)).count()
    }

    fn names_where(&self, pred: impl Fn(&ReconcileAction) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, a)| pred(a))
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Applies fetched state to the inventory under the ownership rules.
pub struct OwnershipReconciler {
    access_point: Arc<dyn AccessPoint>,
    discovery_group: String,
    chunk_size: usize,
    metrics: Option<DiscoveryMetrics>,
}

impl OwnershipReconciler {
    pub fn new(access_point: Arc<dyn AccessPoint>, discovery_group: impl Into<String>) -> Self {
        Self {
            access_point,
            discovery_group: discovery_group.into(),
            chunk_size: 50,
            metrics: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Option<DiscoveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn discovery_group(&self) -> &str {
        &self.discovery_group
    }

    /// Reconciles every resource of `kind` against `fetched`.
    ///
    /// Fails only when the current inventory cannot be listed; per-resource
    /// failures are recorded in the report. With `allow_deletes` unset,
    /// owned resources missing from `fetched` are kept. Names in `retain`
    /// are never deleted.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        fetched: Vec<Resource>,
        retain: &HashSet<String>,
        allow_deletes: bool,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<ReconcileReport> {
        let mut report = ReconcileReport::new(kind);
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let current: HashMap<String, Resource> = list_all_resources(&*self.access_point, kind)
            .await?
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();

        let mut desired: Vec<Resource> = dedupe_by_name(fetched);
        for resource in &mut desired {
            ownership::stamp(resource, &self.discovery_group);
        }

        let self_enrolled = if kind == ResourceKind::Node {
            self_enrolled_identities(&current)
        } else {
            HashMap::new()
        };

        let chunks: Vec<&[Resource]> = desired.chunks(self.chunk_size).collect();
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                warn!(kind = %kind, remaining = total - index, "Reconciliation cancelled");
                return Ok(report);
            }
            info!(
                kind = %kind,
                chunk = index + 1,
                chunks = total,
                resources = chunk.len(),
                "Reconciling chunk of discovered resources"
            );
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|resource| self.apply(resource, &current, &self_enrolled)),
            )
            .await;
            for (resource, action) in chunk.iter().zip(outcomes) {
                if let ReconcileAction::Failed(err) = &action {
                    warn!(
                        kind = %kind,
                        name = %resource.name(),
                        error = %err,
                        "Failed to reconcile resource"
                    );
                }
                report.outcomes.insert(resource.name().to_string(), action);
            }
            report.chunks += 1;
        }

        if allow_deletes {
            let keep: HashSet<&str> = desired
                .iter()
                .map(|r| r.name())
                .chain(retain.iter().map(String::as_str))
                .chain(self_enrolled.values().map(String::as_str))
                .collect();
            self.delete_missing(kind, &current, &keep, cancel, &mut report)
                .await;
        } else {
            report.deletions_skipped = true;
        }

        self.record_metrics(&report);
        Ok(report)
    }

    async fn apply(
        &self,
        desired: &Resource,
        current: &HashMap<String, Resource>,
        self_enrolled: &HashMap<InstanceIdentity, String>,
    ) -> ReconcileAction {
        let enrolled_as = desired
            .instance_identity()
            .and_then(|identity| self_enrolled.get(&identity))
            .filter(|other| other.as_str() != desired.name());
        if let Some(other) = enrolled_as {
            debug!(name = %desired.name(), registered_as = %other, "Instance is already enrolled");
            return ReconcileAction::AlreadyEnrolled;
        }

        let result = match current.get(desired.name()) {
            None => self.create(desired).await,
            Some(existing) => self.converge(desired, existing).await,
        };
        result.unwrap_or_else(ReconcileAction::Failed)
    }

    async fn create(&self, desired: &Resource) -> DiscoveryResult<ReconcileAction> {
        match self.access_point.create_resource(desired.clone()).await {
            Ok(_) => {
                info!(
                    kind = %desired.kind(),
                    name = %desired.name(),
                    "Registered discovered resource"
                );
                Ok(ReconcileAction::Created)
            }
            Err(err) if err.is_already_exists() => {
                // Another engine won the race; decide from what it stored.
                let existing = self
                    .access_point
                    .get_resource(desired.kind(), desired.name())
                    .await?;
                self.converge(desired, &existing).await
            }
            Err(err) => Err(err),
        }
    }

    async fn converge(
        &self,
        desired: &Resource,
        existing: &Resource,
    ) -> DiscoveryResult<ReconcileAction> {
        match ownership::classify(existing, &self.discovery_group) {
            Ownership::Foreign(reason) => Err(ownership::conflict(existing, reason)),
            Ownership::Owned if !desired.differs_from(existing) => {
                debug!("{} {} is already registered.", desired.kind(), desired.name());
                Ok(ReconcileAction::Unchanged)
            }
            Ownership::Owned => {
                self.update(desired, existing).await?;
                Ok(ReconcileAction::Updated)
            }
            Ownership::Claimable => {
                self.update(desired, existing).await?;
                info!(
                    kind = %desired.kind(),
                    name = %desired.name(),
                    discovery_group = %self.discovery_group,
                    "Claimed discovered resource"
                );
                Ok(ReconcileAction::Claimed)
            }
        }
    }

    /// Conditional update against the revision `existing` was read at. A lost
    /// race is re-evaluated once against the fresh copy.
    async fn update(&self, desired: &Resource, existing: &Resource) -> DiscoveryResult<()> {
        let mut write = desired.clone();
        write.metadata.revision = existing.metadata.revision.clone();
        match self.access_point.update_resource(write).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_compare_failed() => {
                let fresh = self
                    .access_point
                    .get_resource(desired.kind(), desired.name())
                    .await?;
                match ownership::classify(&fresh, &self.discovery_group) {
                    Ownership::Foreign(reason) => Err(ownership::conflict(&fresh, reason)),
                    _ if !desired.differs_from(&fresh) => Ok(()),
                    _ => {
                        let mut retry = desired.clone();
                        retry.metadata.revision = fresh.metadata.revision;
                        self.access_point.update_resource(retry).await.map(|_| ())
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_missing(
        &self,
        kind: ResourceKind,
        current: &HashMap<String, Resource>,
        keep: &HashSet<&str>,
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        let mut stale: Vec<&Resource> = current
            .values()
            .filter(|r| !keep.contains(r.name()))
            .filter(|r| ownership::is_deletable(r, &self.discovery_group))
            .collect();
        stale.sort_by(|a, b| a.name().cmp(b.name()));

        for chunk in stale.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            let results = join_all(
                chunk
                    .iter()
                    .map(|r| self.access_point.delete_resource(kind, r.name())),
            )
            .await;
            for (resource, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => {
                        info!(
                            kind = %kind,
                            name = %resource.name(),
                            "Deleted resource no longer present in the cloud"
                        );
                        report.deleted.push(resource.name().to_string());
                    }
                    Err(err) if err.is_not_found() => {
                        report.deleted.push(resource.name().to_string());
                    }
                    Err(err) => {
                        warn!(
                            kind = %kind,
                            name = %resource.name(),
                            error = %err,
                            "Failed to delete resource"
                        );
                        report.delete_errors.push((resource.name().to_string(), err));
                    }
                }
            }
        }
    }

    fn record_metrics(&self, report: &ReconcileReport) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
        for action in report.outcomes.values() {
            *counts.entry(action.metric_label()).or_default() += 1;
        }
        for (action, count) in counts {
            metrics.record_reconcile(report.kind.as_str(), action, count);
        }
        metrics.record_reconcile(report.kind.as_str(), "delete", report.deleted.len() as u64);
    }
}

/// Keeps the last occurrence of every name.
fn dedupe_by_name(resources: Vec<Resource>) -> Vec<Resource> {
    let mut by_name: BTreeMap<String, Resource> = BTreeMap::new();
    for resource in resources {
        by_name.insert(resource.name().to_string(), resource);
    }
    by_name.into_values().collect()
}

/// Cloud identities of nodes that registered themselves (not via discovery).
fn self_enrolled_identities(
    current: &HashMap<String, Resource>,
) -> HashMap<InstanceIdentity, String> {
    current
        .values()
        .filter(|r| r.origin() != Some(ORIGIN_CLOUD))
        .filter_map(|r| {
            InstanceIdentity::from_labels(r.labels())
                .map(|identity| (identity, r.name().to_string()))
        })
        .collect()
}
