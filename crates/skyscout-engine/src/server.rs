//! The discovery server: poll loop and per-cycle orchestration.
//!
//! ```text
//!  tick / config change
//!        │
//!        ▼
//!  ┌──────────┐   ┌─────────────┐   ┌────────────┐   ┌─────────────────┐
//!  │ Fetching │──▶│ Reconciling │──▶│ Installing │──▶│ ReportingStatus │──▶ Idle
//!  └──────────┘   └─────────────┘   └────────────┘   └─────────────────┘
//!   all fetchers   per resource      created nodes     status, user tasks,
//!   concurrently   kind, chunked     only              usage events
//! ```
//!
//! Failures are isolated per fetcher, per chunk and per instance. A resource
//! kind whose fetchers failed this cycle keeps its stale resources until a
//! clean fetch.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};
use skyscout_core::labels;
use skyscout_core::matcher::DEFAULT_INSTALL_SCRIPT;
use skyscout_core::user_task::{Ec2InstanceIssue, EksClusterIssue, RdsDatabaseIssue};
use skyscout_core::{
    AccessPoint, AuditEmitter, Clock, DiscardEmitter, DiscoveredResource, DiscoveryError,
    DiscoveryResult, EnrollClustersRequest, InstallParams, InstanceIdentity, RemoteExecutor,
    ResourceKind, ResourceSpec, SystemClock, UsageReporter, list_all_resources,
};
use skyscout_fetchers::{CloudClients, FetcherKind, ResourceFetcher};
use skyscout_observability::DiscoveryMetrics;

use crate::installer::{InstallReport, InstallStatus, InstallTarget, Installer};
use crate::reconciler::{OwnershipReconciler, ReconcileAction, ReconcileReport};
use crate::registry::DynamicMatcherRegistry;
use crate::settings::EngineSettings;
use crate::status::{CountKey, CycleCounts, StatusReporter};
use crate::tasks::{FailureTaskManager, TaskBatch, TaskScope, provenance};
use crate::usage::UsageTracker;

/// External collaborators of a [`Server`].
#[derive(Clone)]
pub struct Collaborators {
    pub access_point: Arc<dyn AccessPoint>,
    pub clients: Arc<dyn CloudClients>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub audit: Arc<dyn AuditEmitter>,
    pub usage: Arc<dyn UsageReporter>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<DiscoveryMetrics>,
}

impl Collaborators {
    /// Collaborators that drop audit and usage events and use the system
    /// clock.
    pub fn new(
        access_point: Arc<dyn AccessPoint>,
        clients: Arc<dyn CloudClients>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            access_point,
            clients,
            executor,
            audit: Arc::new(DiscardEmitter),
            usage: Arc::new(DiscardEmitter),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditEmitter>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_usage(mut self, usage: Arc<dyn UsageReporter>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: DiscoveryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// A fetcher that failed this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub fetcher: String,
    pub scope: String,
    pub error: DiscoveryError,
}

/// Everything one discovery cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub fetchers: usize,
    pub found: usize,
    pub fetch_failures: Vec<FetchFailure>,
    pub reconciled: BTreeMap<ResourceKind, ReconcileReport>,
    pub reconcile_failures: Vec<(ResourceKind, DiscoveryError)>,
    pub installs: InstallReport,
    /// EKS clusters handed to the enroller and accepted.
    pub enrolled_clusters: Vec<String>,
    pub cluster_failures: Vec<(String, String)>,
    pub counts: CycleCounts,
    pub status_dropped: Vec<String>,
    pub tasks_written: usize,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn reconciled(&self, kind: ResourceKind) -> Option<&ReconcileReport> {
        self.reconciled.get(&kind)
    }
}

/// A fetched resource and the fetcher that produced it.
struct Found {
    resource: DiscoveredResource,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl Found {
    fn count_key(&self) -> CountKey<'_> {
        CountKey {
            discovery_config: self.fetcher.discovery_config(),
            integration: self.fetcher.integration(),
            summary: self.resource.summary,
        }
    }

    fn is_integration_eks(&self) -> bool {
        self.fetcher.kind() == FetcherKind::AwsEks && self.fetcher.integration().is_some()
    }
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct Engine {
    settings: EngineSettings,
    access_point: Arc<dyn AccessPoint>,
    clock: Arc<dyn Clock>,
    registry: Arc<DynamicMatcherRegistry>,
    reconciler: OwnershipReconciler,
    installer: Installer,
    status: StatusReporter,
    tasks: FailureTaskManager,
    usage: UsageTracker,
    metrics: Option<DiscoveryMetrics>,
    cycles: broadcast::Sender<CycleReport>,
    cycle_lock: Mutex<()>,
    cycle_count: AtomicU64,
}

/// Discovery server bound to one discovery group.
pub struct Server {
    engine: Arc<Engine>,
    running: Mutex<Option<Running>>,
}

impl Server {
    /// Builds the server and its static fetchers.
    ///
    /// Matchers that cannot be turned into fetchers are dropped with a
    /// warning. Having no fetcher at all is only an error when there is no
    /// discovery group to load dynamic matchers for.
    pub fn new(settings: EngineSettings, collaborators: Collaborators) -> DiscoveryResult<Self> {
        settings.validate()?;
        let Collaborators {
            access_point,
            clients,
            executor,
            audit,
            usage,
            clock,
            metrics,
        } = collaborators;

        let registry =
            DynamicMatcherRegistry::new(&settings, clients).with_metrics(metrics.clone());
        if registry.static_len() == 0 && settings.discovery_group.is_empty() {
            return Err(DiscoveryError::BadParameter(
                "no matchers or discovery group configured for discovery".to_string(),
            ));
        }

        let reconciler =
            OwnershipReconciler::new(access_point.clone(), settings.discovery_group.clone())
                .with_chunk_size(settings.reconcile_chunk_size)
                .with_metrics(metrics.clone());
        let installer = Installer::new(
            executor,
            audit,
            clock.clone(),
            settings.install_concurrency,
            settings.install_timeout,
        )
        .with_metrics(metrics.clone());
        let (cycles, _) = broadcast::channel(16);

        info!(
            discovery_group = %settings.discovery_group,
            static_fetchers = registry.static_len(),
            "Discovery server configured"
        );

        Ok(Self {
            engine: Arc::new(Engine {
                status: StatusReporter::new(access_point.clone(), clock.clone()),
                tasks: FailureTaskManager::new(access_point.clone()),
                usage: UsageTracker::new(usage),
                registry: Arc::new(registry),
                settings,
                access_point,
                clock,
                reconciler,
                installer,
                metrics,
                cycles,
                cycle_lock: Mutex::new(()),
                cycle_count: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        })
    }

    pub fn discovery_group(&self) -> &str {
        &self.engine.settings.discovery_group
    }

    pub fn registry(&self) -> &DynamicMatcherRegistry {
        &self.engine.registry
    }

    /// Receives the report of every cycle run after subscribing.
    pub fn subscribe_cycles(&self) -> broadcast::Receiver<CycleReport> {
        self.engine.cycles.subscribe()
    }

    /// Loads the DiscoveryConfigs of this group without starting the loop.
    pub async fn sync_configs(&self) -> DiscoveryResult<()> {
        if self.engine.settings.discovery_group.is_empty() {
            return Ok(());
        }
        self.engine
            .registry
            .resync(&*self.engine.access_point)
            .await
    }

    /// Runs exactly one discovery cycle.
    pub async fn run_once(&self) -> CycleReport {
        self.engine.run_cycle(&CancellationToken::new()).await
    }

    /// Starts the config watch and the poll loop. Does nothing when already
    /// running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }
        let cancel = CancellationToken::new();

        let watch = tokio::spawn({
            let registry = self.engine.registry.clone();
            let access_point = self.engine.access_point.clone();
            let retry = self.engine.settings.watch_retry_interval;
            let cancel = cancel.clone();
            async move { registry.watch_configs(access_point, retry, cancel).await }
        });
        let poll = tokio::spawn(self.engine.clone().poll_loop(cancel.clone()));

        info!(discovery_group = %self.engine.settings.discovery_group, "Discovery server started");
        *running = Some(Running {
            cancel,
            handles: vec![watch, poll],
        });
    }

    /// Stops the loop and waits for the current cycle to observe
    /// cancellation. Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        for handle in running.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Discovery task ended abnormally");
            }
        }
        info!(discovery_group = %self.engine.settings.discovery_group, "Discovery server stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Ok(running) = self.running.try_lock()
            && let Some(running) = running.as_ref()
        {
            running.cancel.cancel();
        }
    }
}

impl Engine {
    async fn poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
                _ = self.registry.changed() => {
                    debug!("Discovery configs changed, polling immediately");
                }
            }
            let report = self.run_cycle(&cancel).await;
            if report.cancelled {
                return;
            }
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let mut report = CycleReport {
            cycle: self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1,
            ..Default::default()
        };
        let sync_time = self.clock.now();
        self.installer.begin_cycle().await;

        let snapshot = self.registry.snapshot().await;
        let fetchers: Vec<Arc<dyn ResourceFetcher>> = snapshot.all().cloned().collect();
        report.fetchers = fetchers.len();

        let results = join_all(fetchers.iter().map(|f| self.fetch(f.clone(), cancel))).await;
        if cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        let mut found: Vec<Found> = Vec::new();
        let mut failed_kinds: HashSet<ResourceKind> = HashSet::new();
        let mut ran: BTreeSet<(String, String)> = BTreeSet::new();
        for (fetcher, result) in fetchers.into_iter().zip(results) {
            ran.insert((
                fetcher.cloud().provider_name().to_string(),
                fetcher.kind().matcher_type().to_string(),
            ));
            match result {
                Ok(resources) => found.extend(resources.into_iter().map(|resource| Found {
                    resource,
                    fetcher: fetcher.clone(),
                })),
                Err(error) => {
                    failed_kinds.insert(fetcher.resource_kind());
                    report.fetch_failures.push(FetchFailure {
                        fetcher: fetcher.kind().to_string(),
                        scope: fetcher.scope(),
                        error,
                    });
                }
            }
        }
        report.found = found.len();
        for item in &found {
            report.counts.found(item.count_key(), 1);
        }

        let mut tasks = TaskBatch::new();
        let mut created: Vec<&Found> = Vec::new();

        let (eks, registered): (Vec<&Found>, Vec<&Found>) =
            found.iter().partition(|f| f.is_integration_eks());
        let retained: HashSet<String> = eks.iter().map(|f| f.resource.name().to_string()).collect();

        for kind in ResourceKind::ALL {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            // First finder wins: static matchers, then configs by name.
            let mut by_name: BTreeMap<&str, Vec<&Found>> = BTreeMap::new();
            for item in registered.iter().filter(|f| f.resource.kind() == kind) {
                by_name.entry(item.resource.name()).or_default().push(*item);
            }
            let fetched = by_name
                .values()
                .map(|items| items[0].resource.resource.clone())
                .collect();
            let retain = if kind == ResourceKind::KubeCluster {
                retained.clone()
            } else {
                HashSet::new()
            };
            let allow_deletes = !failed_kinds.contains(&kind);
            if !allow_deletes {
                warn!(kind = %kind, "Fetch errors this cycle, skipping deletions");
            }

            match self
                .reconciler
                .reconcile(kind, fetched, &retain, allow_deletes, cancel)
                .await
            {
                Ok(outcome) => {
                    for (name, action) in &outcome.outcomes {
                        let Some(items) = by_name.get(name.as_str()) else {
                            continue;
                        };
                        for item in items {
                            self.count_outcome(&mut report.counts, item, action);
                        }
                        let winner = items[0];
                        if *action == ReconcileAction::Created {
                            created.push(winner);
                        }
                        if action.is_registered() {
                            self.check_prerequisites(&mut tasks, winner, sync_time);
                        }
                    }
                    report.cancelled |= outcome.cancelled;
                    report.reconciled.insert(kind, outcome);
                }
                Err(err) => {
                    warn!(kind = %kind, error = %err, "Failed to reconcile resource kind");
                    for item in by_name.values().flatten() {
                        report.counts.failed(item.count_key(), 1);
                    }
                    report.reconcile_failures.push((kind, err));
                }
            }
        }

        if !report.cancelled && !eks.is_empty() {
            let enrolled = self
                .enroll_clusters(&eks, &mut report, &mut tasks, sync_time)
                .await;
            created.extend(enrolled);
        }

        if !report.cancelled {
            let targets: Vec<InstallTarget> = created
                .iter()
                .filter_map(|item| install_target(item))
                .collect();
            if !targets.is_empty() {
                report.installs = self.installer.run(targets, cancel).await;
                report.cancelled |= cancel.is_cancelled();
                self.after_installs(
                    &report.installs,
                    &found,
                    &mut report.counts,
                    &mut tasks,
                    sync_time,
                )
                .await;
            }
        }

        if report.cancelled {
            self.roll_back_uninstalled(&created, &report.installs).await;
            warn!(cycle = report.cycle, "Discovery cycle cancelled");
            return report;
        }

        report.tasks_written = self.tasks.flush(tasks).await;
        let failed_installs: HashSet<String> = report
            .installs
            .failed()
            .map(|e| e.target.node_name.clone())
            .collect();
        self.usage
            .resources_created(
                created
                    .iter()
                    .filter(|item| !failed_installs.contains(item.resource.name()))
                    .map(|item| &item.resource),
            )
            .await;
        self.usage.fetch_ran(&ran).await;

        let configs: BTreeSet<String> = snapshot.config_names().map(str::to_string).collect();
        report.status_dropped = self.status.report(&configs, &report.counts).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle();
        }
        info!(
            cycle = report.cycle,
            discovery_group = %self.settings.discovery_group,
            fetchers = report.fetchers,
            found = report.found,
            fetch_failures = report.fetch_failures.len(),
            installs = report.installs.entries.len(),
            "Discovery cycle completed"
        );
        let _ = self.cycles.send(report.clone());
        report
    }

    async fn fetch(
        &self,
        fetcher: Arc<dyn ResourceFetcher>,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<Vec<DiscoveredResource>> {
        let started = Instant::now();
        let timeout = self.settings.fetch_timeout;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            result = tokio::time::timeout(timeout, fetcher.fetch()) => {
                result.map_err(|_| DiscoveryError::Timeout(timeout)).and_then(|r| r)
            }
        };
        if let Err(err) = &result {
            warn!(
                fetcher = %fetcher.kind(),
                scope = %fetcher.scope(),
                integration = fetcher.integration().unwrap_or_default(),
                error = %err,
                retryable = err.is_retryable(),
                "Fetcher failed"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_fetch(&fetcher.kind().to_string(), result.is_ok(), started.elapsed());
        }
        result
    }

    /// Status counters for one reconciled resource. Compute instances count
    /// as enrolled only when they were registered before this cycle; fresh
    /// ones are settled by the installer.
    fn count_outcome(&self, counts: &mut CycleCounts, item: &Found, action: &ReconcileAction) {
        let key = item.count_key();
        match action {
            ReconcileAction::Failed(_) => counts.failed(key, 1),
            ReconcileAction::Created if item.resource.kind() == ResourceKind::Node => {}
            _ => counts.enrolled(key, 1),
        }
    }

    /// Prerequisite checks on registered resources.
    fn check_prerequisites(&self, tasks: &mut TaskBatch, item: &Found, sync_time: DateTime<Utc>) {
        let Some(integration) = item.fetcher.integration() else {
            return;
        };
        if item.fetcher.kind() != FetcherKind::AwsRds {
            return;
        }
        let ResourceSpec::Database(db) = &item.resource.resource.spec else {
            return;
        };
        if db.meta.iam_auth_enabled {
            return;
        }
        tasks.rds_iam_auth_disabled(
            TaskScope {
                integration,
                account_id: &db.meta.account,
                region: &db.meta.region,
            },
            RdsDatabaseIssue {
                name: db.meta.native_name.clone(),
                engine: db.meta.engine.clone(),
                is_cluster: db.meta.is_cluster,
                provenance: provenance(
                    item.fetcher.discovery_config(),
                    &self.settings.discovery_group,
                    sync_time,
                ),
            },
        );
    }

    /// Hands EKS clusters found through an integration to the enroller,
    /// skipping those already registered. Returns the clusters it accepted.
    async fn enroll_clusters<'a>(
        &self,
        eks: &[&'a Found],
        report: &mut CycleReport,
        tasks: &mut TaskBatch,
        sync_time: DateTime<Utc>,
    ) -> Vec<&'a Found> {
        let existing: HashSet<String> =
            match list_all_resources(&*self.access_point, ResourceKind::KubeCluster).await {
                Ok(clusters) => clusters.iter().map(|c| c.name().to_string()).collect(),
                Err(err) => {
                    warn!(
                        error = %err,
                        "Failed to list registered clusters, skipping EKS enrollment"
                    );
                    for item in eks {
                        report.counts.failed(item.count_key(), 1);
                    }
                    return Vec::new();
                }
            };

        let mut batches: BTreeMap<EnrollBatchKey, Vec<(&'a Found, String)>> = BTreeMap::new();
        for item in eks {
            if existing.contains(item.resource.name()) {
                report.counts.enrolled(item.count_key(), 1);
                continue;
            }
            let ResourceSpec::KubeCluster(spec) = &item.resource.resource.spec else {
                continue;
            };
            let key = (
                item.fetcher.integration().unwrap_or_default().to_string(),
                spec.account.clone(),
                spec.region.clone(),
                item.fetcher.discovery_config().map(str::to_string),
            );
            batches
                .entry(key)
                .or_default()
                .push((*item, spec.cluster_name.clone()));
        }

        let mut accepted = Vec::new();
        for ((integration, account_id, region, discovery_config), clusters) in batches {
            let request = EnrollClustersRequest {
                integration: integration.clone(),
                account_id: account_id.clone(),
                region: region.clone(),
                cluster_names: clusters.iter().map(|(_, name)| name.clone()).collect(),
                discovery_group: self.settings.discovery_group.clone(),
                discovery_config: discovery_config.clone(),
            };
            let response = self.access_point.enroll_clusters(request).await;
            let errors: HashMap<String, Option<String>> = match response {
                Ok(response) => response
                    .results
                    .into_iter()
                    .map(|r| (r.cluster_name, r.error))
                    .collect(),
                Err(err) => {
                    warn!(
                        integration = %integration,
                        region = %region,
                        error = %err,
                        "EKS enrollment request failed"
                    );
                    clusters
                        .iter()
                        .map(|(_, name)| (name.clone(), Some(err.to_string())))
                        .collect()
                }
            };

            for (item, cluster) in clusters {
                match errors.get(&cluster).cloned().flatten() {
                    None => {
                        info!(
                            cluster = %cluster,
                            integration = %integration,
                            "Enrolled EKS cluster"
                        );
                        report.counts.enrolled(item.count_key(), 1);
                        report.enrolled_clusters.push(cluster);
                        accepted.push(item);
                    }
                    Some(error) => {
                        warn!(
                            cluster = %cluster,
                            integration = %integration,
                            error = %error,
                            "Failed to enroll EKS cluster"
                        );
                        report.counts.failed(item.count_key(), 1);
                        tasks.eks_enrollment_failure(
                            TaskScope {
                                integration: &integration,
                                account_id: &account_id,
                                region: &region,
                            },
                            EksClusterIssue {
                                name: cluster.clone(),
                                error: error.clone(),
                                provenance: provenance(
                                    discovery_config.as_deref(),
                                    &self.settings.discovery_group,
                                    sync_time,
                                ),
                            },
                        );
                        report.cluster_failures.push((cluster, error));
                    }
                }
            }
        }
        accepted
    }

    /// Counts install failures, opens user tasks for them and removes the
    /// node so the next cycle registers and installs it again.
    async fn after_installs(
        &self,
        installs: &InstallReport,
        found: &[Found],
        counts: &mut CycleCounts,
        tasks: &mut TaskBatch,
        sync_time: DateTime<Utc>,
    ) {
        let mut by_name: HashMap<&str, Vec<&Found>> = HashMap::new();
        for item in found {
            by_name.entry(item.resource.name()).or_default().push(item);
        }
        for entry in installs.failed() {
            let Some(items) = by_name.get(entry.target.node_name.as_str()) else {
                continue;
            };
            for item in items {
                counts.failed(item.count_key(), 1);
            }

            if let Err(err) = self
                .access_point
                .delete_resource(ResourceKind::Node, &entry.target.node_name)
                .await
                && !err.is_not_found()
            {
                warn!(
                    node = %entry.target.node_name,
                    error = %err,
                    "Failed to remove node after failed install"
                );
            }

            let InstallStatus::Failed { error, .. } = &entry.status else {
                continue;
            };
            if let (
                Some(integration),
                InstanceIdentity::Aws {
                    account_id,
                    instance_id,
                },
            ) = (entry.target.integration.as_deref(), &entry.target.identity)
            {
                tasks.ec2_install_failure(
                    TaskScope {
                        integration,
                        account_id,
                        region: &entry.target.region,
                    },
                    Ec2InstanceIssue {
                        instance_id: instance_id.clone(),
                        name: entry.target.node_name.clone(),
                        invocation_error: Some(error.clone()),
                        provenance: provenance(
                            entry.target.discovery_config.as_deref(),
                            &self.settings.discovery_group,
                            sync_time,
                        ),
                    },
                );
            }
        }
    }

    /// Removes nodes created this cycle whose install was cancelled or never
    /// started. Left in place they would reconcile as unchanged and never
    /// reach the installer again.
    async fn roll_back_uninstalled(&self, created: &[&Found], installs: &InstallReport) {
        for item in created {
            let Some(target) = install_target(item) else {
                continue;
            };
            let status = installs
                .entries
                .iter()
                .find(|e| e.target.node_name == target.node_name)
                .map(|e| &e.status);
            if !matches!(status, None | Some(InstallStatus::Cancelled)) {
                continue;
            }
            match self
                .access_point
                .delete_resource(ResourceKind::Node, &target.node_name)
                .await
            {
                Ok(()) => {
                    debug!(node = %target.node_name, "Removed node of an interrupted install")
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!(
                    node = %target.node_name,
                    error = %err,
                    "Failed to remove node after cancelled install"
                ),
            }
        }
    }
}

/// (integration, account, region, discovery config)
type EnrollBatchKey = (String, String, String, Option<String>);

/// Install target of a freshly created node.
fn install_target(item: &Found) -> Option<InstallTarget> {
    let identity = item.resource.resource.instance_identity()?;
    let region = item
        .resource
        .resource
        .labels()
        .get(labels::REGION)
        .cloned()
        .unwrap_or_default();
    let params = item
        .fetcher
        .install_params()
        .cloned()
        .unwrap_or_else(|| InstallParams {
            script_name: DEFAULT_INSTALL_SCRIPT.to_string(),
            ..Default::default()
        });
    Some(InstallTarget {
        node_name: item.resource.name().to_string(),
        identity,
        region,
        integration: item.fetcher.integration().map(str::to_string),
        assume_role: item.fetcher.assume_role().cloned(),
        params,
        document: item.fetcher.install_document().map(str::to_string),
        discovery_config: item.fetcher.discovery_config().map(str::to_string),
    })
}
