//! Contract of the inventory backend the engine reconciles against.
//!
//! The backend is the single source of truth for ownership. It must offer
//! linearizable create (exactly one winner per name, losers see
//! `AlreadyExists`) and revision-conditional updates (`CompareFailed` when the
//! stored revision moved on).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

use crate::discovery_config::{DiscoveryConfig, DiscoveryConfigStatus};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::resource::{Resource, ResourceKind};
use crate::user_task::{UserTask, UserTaskFilters};

/// Default page size used when draining listings.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// What a watch subscription is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    DiscoveryConfig,
    Resource(ResourceKind),
}

/// Events delivered by a [`Watcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The subscription is established; events after this are live.
    Init,
    DiscoveryConfigPut(DiscoveryConfig),
    DiscoveryConfigDeleted(String),
    ResourcePut(Resource),
    ResourceDeleted { kind: ResourceKind, name: String },
}

/// Receiving end of a watch subscription.
#[derive(Debug)]
pub struct Watcher {
    events: mpsc::Receiver<WatchEvent>,
    error: Arc<OnceLock<DiscoveryError>>,
}

/// Producing end of a watch subscription, held by the backend.
#[derive(Debug, Clone)]
pub struct WatchSender {
    events: mpsc::Sender<WatchEvent>,
    error: Arc<OnceLock<DiscoveryError>>,
}

impl Watcher {
    /// Creates a connected sender/watcher pair.
    pub fn channel(buffer: usize) -> (WatchSender, Watcher) {
        let (tx, rx) = mpsc::channel(buffer);
        let error = Arc::new(OnceLock::new());
        (
            WatchSender {
                events: tx,
                error: error.clone(),
            },
            Watcher { events: rx, error },
        )
    }

    /// Next event, or `None` once the subscription is done.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Whether the subscription has ended and every event was consumed.
    pub fn is_done(&self) -> bool {
        self.events.is_closed() && self.events.is_empty()
    }

    /// Stops the subscription. Buffered events can still be drained.
    pub fn close(&mut self) {
        self.events.close();
    }

    /// Why the backend ended the subscription, if it failed.
    pub fn error(&self) -> Option<DiscoveryError> {
        self.error.get().cloned()
    }
}

impl WatchSender {
    /// Delivers an event. Returns false when the watcher is gone.
    pub async fn send(&self, event: WatchEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub fn try_send(&self, event: WatchEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    /// Records a terminal error. The subscription ends once every sender is
    /// dropped.
    pub fn fail(&self, err: DiscoveryError) {
        let _ = self.error.set(err);
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Request to enroll managed Kubernetes clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollClustersRequest {
    pub integration: String,
    pub account_id: String,
    pub region: String,
    pub cluster_names: Vec<String>,
    pub discovery_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollClusterResult {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollClustersResponse {
    pub results: Vec<EnrollClusterResult>,
}

/// Inventory backend consumed by the engine.
#[async_trait]
pub trait AccessPoint: Send + Sync {
    /// Creates a resource; fails with `AlreadyExists` on a name collision.
    async fn create_resource(&self, resource: Resource) -> DiscoveryResult<Resource>;

    /// Replaces a resource. When `metadata.revision` is set, the write only
    /// succeeds if it matches the stored revision.
    async fn update_resource(&self, resource: Resource) -> DiscoveryResult<Resource>;

    async fn get_resource(&self, kind: ResourceKind, name: &str) -> DiscoveryResult<Resource>;

    async fn list_resources(
        &self,
        kind: ResourceKind,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<Resource>>;

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> DiscoveryResult<()>;

    async fn list_discovery_configs(
        &self,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<DiscoveryConfig>>;

    async fn get_discovery_config(&self, name: &str) -> DiscoveryResult<DiscoveryConfig>;

    /// Subscribes to changes. The first event is always [`WatchEvent::Init`].
    async fn watch(&self, kinds: &[WatchKind]) -> DiscoveryResult<Watcher>;

    /// Writes the status sub-object, conditional on `revision` when given.
    async fn update_discovery_config_status(
        &self,
        name: &str,
        status: DiscoveryConfigStatus,
        revision: Option<&str>,
    ) -> DiscoveryResult<DiscoveryConfig>;

    async fn enroll_clusters(
        &self,
        request: EnrollClustersRequest,
    ) -> DiscoveryResult<EnrollClustersResponse>;

    async fn create_or_upsert_user_task(&self, task: UserTask) -> DiscoveryResult<UserTask>;

    async fn get_user_task(&self, name: &str) -> DiscoveryResult<UserTask>;

    async fn list_user_tasks(
        &self,
        filters: &UserTaskFilters,
        page_size: usize,
        page_token: Option<String>,
    ) -> DiscoveryResult<Page<UserTask>>;
}

/// Drains every page of a resource listing.
pub async fn list_all_resources(
    access_point: &dyn AccessPoint,
    kind: ResourceKind,
) -> DiscoveryResult<Vec<Resource>> {
    let mut all = Vec::new();
    let mut token = None;
    loop {
        let page = access_point
            .list_resources(kind, DEFAULT_PAGE_SIZE, token)
            .await?;
        all.extend(page.items);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(all),
        }
    }
}

/// Drains every page of the DiscoveryConfig listing.
pub async fn list_all_discovery_configs(
    access_point: &dyn AccessPoint,
) -> DiscoveryResult<Vec<DiscoveryConfig>> {
    let mut all = Vec::new();
    let mut token = None;
    loop {
        let page = access_point
            .list_discovery_configs(DEFAULT_PAGE_SIZE, token)
            .await?;
        all.extend(page.items);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(all),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_reports_failure_after_sender_drops() {
        let (tx, mut watcher) = Watcher::channel(4);
        assert!(tx.send(WatchEvent::Init).await);
        tx.fail(DiscoveryError::Connection("stream reset".to_string()));
        drop(tx);

        assert_eq!(watcher.next().await, Some(WatchEvent::Init));
        assert_eq!(watcher.next().await, None);
        assert!(watcher.is_done());
        assert_eq!(
            watcher.error(),
            Some(DiscoveryError::Connection("stream reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let (tx, mut watcher) = Watcher::channel(4);
        watcher.close();
        assert!(!tx.send(WatchEvent::Init).await);
        assert!(tx.is_closed());
        assert_eq!(watcher.error(), None);
    }
}
