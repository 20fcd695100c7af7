//! In-memory inventory backend.
//!
//! Every operation runs under one lock, which makes create and conditional
//! update linearizable: of two concurrent creates of the same name exactly one
//! succeeds and the other sees `AlreadyExists`.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use skyscout_core::labels;
use skyscout_core::matcher::types;
use skyscout_core::naming::qualified_name;
use skyscout_core::{
    AccessPoint, Cloud, DiscoveryConfig, DiscoveryConfigStatus, DiscoveryError, DiscoveryResult,
    EnrollClusterResult, EnrollClustersRequest, EnrollClustersResponse, KubeClusterSpec, Page,
    Resource, ResourceKind, ResourceSpec, UserTask, UserTaskFilters, WatchEvent, WatchKind,
    WatchSender, Watcher,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateResource,
    UpdateResource,
    GetResource,
    ListResources,
    DeleteResource,
    ListDiscoveryConfigs,
    Watch,
    UpdateStatus,
    EnrollClusters,
    UpsertUserTask,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<(ResourceKind, String), Resource>,
    configs: BTreeMap<String, DiscoveryConfig>,
    tasks: BTreeMap<String, UserTask>,
    watchers: Vec<(Vec<WatchKind>, WatchSender)>,
    faults: HashMap<Operation, VecDeque<DiscoveryError>>,
    create_faults: HashMap<String, DiscoveryError>,
    enroll_failures: HashMap<String, String>,
    enroll_requests: Vec<EnrollClustersRequest>,
    status_writes: Vec<(String, DiscoveryConfigStatus)>,
    next_revision: u64,
}

impl State {
    fn revision(&mut self) -> String {
        self.next_revision += 1;
        self.next_revision.to_string()
    }

    fn fault(&mut self, op: Operation) -> DiscoveryResult<()> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn broadcast(&mut self, kind: WatchKind, event: WatchEvent) {
        self.watchers.retain(|(kinds, sender)| {
            if sender.is_closed() {
                return false;
            }
            if kinds.contains(&kind) {
                sender.try_send(event.clone());
            }
            true
        });
    }
}

/// In-memory [`AccessPoint`] with watch fan-out and fault injection.
#[derive(Default)]
pub struct InMemoryAccessPoint {
    state: Mutex<State>,
}

fn paginate<T: Clone>(
    items: Vec<T>,
    page_size: usize,
    token: Option<String>,
) -> DiscoveryResult<Page<T>> {
    let start = match token {
        Some(t) => t
            .parse::<usize>()
            .map_err(|_| DiscoveryError::BadParameter(format!("invalid page token {t:?}")))?,
        None => 0,
    };
    let page_size = page_size.max(1);
    let end = (start + page_size).min(items.len());
    let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    Ok(Page {
        items: page,
        next_token: (end < items.len()).then(|| end.to_string()),
    })
}

/// The cluster resource an enroller registers, named the way discovery
/// names EKS clusters.
fn enrolled_cluster(request: &EnrollClustersRequest, cluster: &str) -> Resource {
    let name = qualified_name(
        cluster,
        &[types::AWS_EKS, &request.region, &request.account_id],
    );
    let mut resource = Resource::new(
        name,
        ResourceSpec::KubeCluster(KubeClusterSpec {
            cloud: Cloud::Aws,
            account: request.account_id.clone(),
            region: request.region.clone(),
            cluster_name: cluster.to_string(),
        }),
    )
    .with_label(labels::ORIGIN, labels::ORIGIN_CLOUD)
    .with_label(labels::INTEGRATION, request.integration.clone());
    if !request.discovery_group.is_empty() {
        resource = resource.with_label(labels::DISCOVERY_GROUP, request.discovery_group.clone());
    }
    if let Some(config) = &request.discovery_config {
        resource = resource.with_label(labels::DISCOVERY_CONFIG, config.clone());
    }
    resource
}

impl InMemoryAccessPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a DiscoveryConfig and notifies watchers.
    pub fn put_discovery_config(&self, mut config: DiscoveryConfig) -> DiscoveryConfig {
        let mut state = self.state.lock().unwrap();
        config.revision = Some(state.revision());
        state.configs.insert(config.name.clone(), config.clone());
        state.broadcast(
            WatchKind::DiscoveryConfig,
            WatchEvent::DiscoveryConfigPut(config.clone()),
        );
        config
    }

    pub fn delete_discovery_config(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if state.configs.remove(name).is_some() {
            state.broadcast(
                WatchKind::DiscoveryConfig,
                WatchEvent::DiscoveryConfigDeleted(name.to_string()),
            );
        }
    }

    pub fn discovery_config(&self, name: &str) -> Option<DiscoveryConfig> {
        self.state.lock().unwrap().configs.get(name).cloned()
    }

    /// Stores a resource as-is, bypassing create semantics.
    pub fn insert_resource(&self, mut resource: Resource) -> Resource {
        let mut state = self.state.lock().unwrap();
        resource.metadata.revision = Some(state.revision());
        state
            .resources
            .insert((resource.kind(), resource.name().to_string()), resource.clone());
        resource
    }

    pub fn resources(&self, kind: ResourceKind) -> Vec<Resource> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn resource(&self, kind: ResourceKind, name: &str) -> Option<Resource> {
        let state = self.state.lock().unwrap();
        state.resources.get(&(kind, name.to_string())).cloned()
    }

    pub fn user_tasks(&self) -> Vec<UserTask> {
        self.state.lock().unwrap().tasks.values().cloned().collect()
    }

    /// Every status written, in order.
    pub fn status_writes(&self) -> Vec<(String, DiscoveryConfigStatus)> {
        self.state.lock().unwrap().status_writes.clone()
    }

    pub fn enroll_requests(&self) -> Vec<EnrollClustersRequest> {
        self.state.lock().unwrap().enroll_requests.clone()
    }

    /// Queues an error for the next call of `op`.
    pub fn fail_next(&self, op: Operation, err: DiscoveryError) {
        let mut state = self.state.lock().unwrap();
        state.faults.entry(op).or_default().push_back(err);
    }

    /// Makes every create of `name` fail with `err`.
    pub fn fail_create_of(&self, name: &str, err: DiscoveryError) {
        let mut state = self.state.lock().unwrap();
        state.create_faults.insert(name.to_string(), err);
    }

    /// Makes enrollment of `cluster` report `error`.
    pub fn fail_enrollment_of(&self, cluster: &str, error: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .enroll_failures
            .insert(cluster.to_string(), error.to_string());
    }

    /// Ends every open watch with `err`.
    pub fn fail_watchers(&self, err: DiscoveryError) {
        let mut state = self.state.lock().unwrap();
        for (_, sender) in state.watchers.drain(..) {
            sender.fail(err.clone());
        }
    }

    pub fn watcher_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.watchers.retain(|(_, sender)| !sender.is_closed());
        state.watchers.len()
    }
}

#[async_trait]
impl AccessPoint for InMemoryAccessPoint {
    async fn create_resource(&self, mut resource: Resource) -> DiscoveryResult<Resource> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::CreateResource)?;
        if let Some(err) = state.create_faults.get(resource.name()) {
            return Err(err.clone());
        }
        let key = (resource.kind(), resource.name().to_string());
        if state.resources.contains_key(&key) {
            return Err(DiscoveryError::AlreadyExists(format!(
                "{} {}",
                resource.kind(),
                resource.name()
            )));
        }
        resource.metadata.revision = Some(state.revision());
        state.resources.insert(key, resource.clone());
        state.broadcast(
            WatchKind::Resource(resource.kind()),
            WatchEvent::ResourcePut(resource.clone()),
        );
        Ok(resource)
    }

    async fn update_resource(&self, mut resource: Resource) -> DiscoveryResult<Resource> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::UpdateResource)?;
        let key = (resource.kind(), resource.name().to_string());
        let stored = state
            .resources
            .get(&key)
            .ok_or_else(|| DiscoveryError::NotFound(format!("{} {}", key.0, key.1)))?;
        if let Some(expected) = &resource.metadata.revision
            && stored.metadata.revision.as_ref() != Some(expected)
        {
            return Err(DiscoveryError::CompareFailed(format!(
                "{} {} was concurrently modified",
                key.0, key.1
            )));
        }
        resource.metadata.revision = Some(state.revision());
        state.resources.insert(key, resource.clone());
        state.broadcast(
            WatchKind::Resource(resource.kind()),
            WatchEvent::ResourcePut(resource.clone()),
        );
        Ok(resource)
    }

    async fn get_resource(&self, kind: ResourceKind, name: &str) -> DiscoveryResult<Resource> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::GetResource)?;
        state
            .resources
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(format!("{kind} {name}")))
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<Resource>> {
        let items = {
            let mut state = self.state.lock().unwrap();
            state.fault(Operation::ListResources)?;
            state
                .resources
                .iter()
                .filter(|((k, _), _)| *k == kind)
                .map(|(_, r)| r.clone())
                .collect::<Vec<_>>()
        };
        paginate(items, page_size, page_token)
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> DiscoveryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::DeleteResource)?;
        if state.resources.remove(&(kind, name.to_string())).is_none() {
            return Err(DiscoveryError::NotFound(format!("{kind} {name}")));
        }
        state.broadcast(
            WatchKind::Resource(kind),
            WatchEvent::ResourceDeleted {
                kind,
                name: name.to_string(),
            },
        );
        Ok(())
    }

    async fn list_discovery_configs(
        &self,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<DiscoveryConfig>> {
        let items = {
            let mut state = self.state.lock().unwrap();
            state.fault(Operation::ListDiscoveryConfigs)?;
            state.configs.values().cloned().collect::<Vec<_>>()
        };
        paginate(items, page_size, page_token)
    }

    async fn get_discovery_config(&self, name: &str) -> DiscoveryResult<DiscoveryConfig> {
        self.discovery_config(name)
            .ok_or_else(|| DiscoveryError::NotFound(format!("discovery config {name}")))
    }

    async fn watch(&self, kinds: &[WatchKind]) -> DiscoveryResult<Watcher> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::Watch)?;
        let (sender, watcher) = Watcher::channel(1024);
        sender.try_send(WatchEvent::Init);
        state.watchers.push((kinds.to_vec(), sender));
        Ok(watcher)
    }

    async fn update_discovery_config_status(
        &self,
        name: &str,
        status: DiscoveryConfigStatus,
        revision: Option<&str>,
    ) -> DiscoveryResult<DiscoveryConfig> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::UpdateStatus)?;
        let next = state.revision();
        let config = state
            .configs
            .get_mut(name)
            .ok_or_else(|| DiscoveryError::NotFound(format!("discovery config {name}")))?;
        if let Some(expected) = revision
            && config.revision.as_deref() != Some(expected)
        {
            return Err(DiscoveryError::CompareFailed(format!(
                "discovery config {name} was concurrently modified"
            )));
        }
        config.status = status.clone();
        config.revision = Some(next);
        let updated = config.clone();
        state.status_writes.push((name.to_string(), status));
        Ok(updated)
    }

    async fn enroll_clusters(
        &self,
        request: EnrollClustersRequest,
    ) -> DiscoveryResult<EnrollClustersResponse> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::EnrollClusters)?;
        let mut results = Vec::with_capacity(request.cluster_names.len());
        for cluster in &request.cluster_names {
            let error = state.enroll_failures.get(cluster).cloned();
            if error.is_none() {
                let mut enrolled = enrolled_cluster(&request, cluster);
                let key = (ResourceKind::KubeCluster, enrolled.name().to_string());
                if !state.resources.contains_key(&key) {
                    enrolled.metadata.revision = Some(state.revision());
                    state.resources.insert(key, enrolled);
                }
            }
            results.push(EnrollClusterResult {
                cluster_name: cluster.clone(),
                error,
            });
        }
        state.enroll_requests.push(request);
        Ok(EnrollClustersResponse { results })
    }

    async fn create_or_upsert_user_task(&self, mut task: UserTask) -> DiscoveryResult<UserTask> {
        let mut state = self.state.lock().unwrap();
        state.fault(Operation::UpsertUserTask)?;
        task.revision = Some(state.revision());
        state.tasks.insert(task.name.clone(), task.clone());
        Ok(task)
    }

    async fn get_user_task(&self, name: &str) -> DiscoveryResult<UserTask> {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .get(name)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(format!("user task {name}")))
    }

    async fn list_user_tasks(
        &self,
        filters: &UserTaskFilters,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<UserTask>> {
        let items = {
            let state = self.state.lock().unwrap();
            state
                .tasks
                .values()
                .filter(|t| filters.matches(t))
                .cloned()
                .collect::<Vec<_>>()
        };
        paginate(items, page_size, page_token)
    }
}
