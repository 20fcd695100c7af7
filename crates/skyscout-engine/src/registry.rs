//! Live fetcher table: static matchers plus DiscoveryConfig-driven matchers.
//!
//! ```text
//! AccessPoint::watch(DiscoveryConfig)
//!        │ put / delete
//!        ▼
//! ┌──────────────────────────────────────────┐
//! │ RwLock<config name → fetchers>           │◀── snapshot() once per cycle
//! └──────────────────────────────────────────┘
//!        │ changed
//!        ▼
//!     Notify ──▶ poll loop runs an immediate cycle
//! ```
//!
//! A config's fetchers are never edited in place; every change rebuilds the
//! whole list for that config name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skyscout_core::{
    AccessPoint, DiscoveryConfig, DiscoveryError, DiscoveryResult, Matchers, WatchEvent, WatchKind,
    list_all_discovery_configs,
};
use skyscout_fetchers::{CloudClients, FetcherOptions, ResourceFetcher, build_fetchers};
use skyscout_observability::DiscoveryMetrics;

use crate::settings::EngineSettings;

struct ConfigEntry {
    matchers: Matchers,
    fetchers: Vec<Arc<dyn ResourceFetcher>>,
}

/// Fetchers of one poll cycle, grouped by origin.
///
/// [`FetcherSnapshot::all`] yields static fetchers first, then dynamic ones
/// by ascending config name.
#[derive(Debug, Clone, Default)]
pub struct FetcherSnapshot {
    pub static_fetchers: Vec<Arc<dyn ResourceFetcher>>,
    /// DiscoveryConfig name → fetchers, including configs with no valid
    /// fetcher.
    pub dynamic: BTreeMap<String, Vec<Arc<dyn ResourceFetcher>>>,
}

impl FetcherSnapshot {
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn ResourceFetcher>> {
        self.static_fetchers
            .iter()
            .chain(self.dynamic.values().flatten())
    }

    pub fn len(&self) -> usize {
        self.static_fetchers.len() + self.dynamic.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config_names(&self) -> impl Iterator<Item = &str> {
        self.dynamic.keys().map(String::as_str)
    }
}

pub struct DynamicMatcherRegistry {
    discovery_group: String,
    integration_only: bool,
    kube_cluster_name: Option<String>,
    clients: Arc<dyn CloudClients>,
    static_fetchers: Vec<Arc<dyn ResourceFetcher>>,
    dynamic: RwLock<BTreeMap<String, ConfigEntry>>,
    changed: Notify,
    metrics: Option<DiscoveryMetrics>,
}

impl DynamicMatcherRegistry {
    /// Builds the static fetchers from `settings`. Matchers that cannot be
    /// turned into fetchers are dropped with a warning.
    pub fn new(settings: &EngineSettings, clients: Arc<dyn CloudClients>) -> Self {
        let mut matchers = settings.matchers.clone();
        if settings.integration_only_credentials {
            let dropped = matchers.retain_integration_only();
            if dropped > 0 {
                warn!(
                    dropped,
                    "Ignoring static matchers without an integration in integration-only mode"
                );
            }
        }
        let options = FetcherOptions {
            discovery_config: None,
            kube_cluster_name: settings.kube_cluster_name.clone(),
        };
        let static_fetchers = build_fetchers(&matchers, &options, clients.clone()).fetchers;

        Self {
            discovery_group: settings.discovery_group.clone(),
            integration_only: settings.integration_only_credentials,
            kube_cluster_name: settings.kube_cluster_name.clone(),
            clients,
            static_fetchers,
            dynamic: RwLock::new(BTreeMap::new()),
            changed: Notify::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<DiscoveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn discovery_group(&self) -> &str {
        &self.discovery_group
    }

    pub fn static_len(&self) -> usize {
        self.static_fetchers.len()
    }

    /// Takes the read lock once and copies the current table.
    pub async fn snapshot(&self) -> FetcherSnapshot {
        let dynamic = self.dynamic.read().await;
        FetcherSnapshot {
            static_fetchers: self.static_fetchers.clone(),
            dynamic: dynamic
                .iter()
                .map(|(name, entry)| (name.clone(), entry.fetchers.clone()))
                .collect(),
        }
    }

    /// Whether `config` belongs to this engine's discovery group.
    pub fn accepts(&self, config: &DiscoveryConfig) -> bool {
        !self.discovery_group.is_empty() && config.discovery_group == self.discovery_group
    }

    fn build(&self, config: &DiscoveryConfig) -> ConfigEntry {
        let mut matchers = config.matchers.clone();
        if self.integration_only {
            let dropped = matchers.retain_integration_only();
            if dropped > 0 {
                warn!(
                    discovery_config = %config.name,
                    dropped,
                    "Ignoring matchers without an integration in integration-only mode"
                );
            }
        }
        let options = FetcherOptions {
            discovery_config: Some(config.name.clone()),
            kube_cluster_name: self.kube_cluster_name.clone(),
        };
        let fetchers = build_fetchers(&matchers, &options, self.clients.clone()).fetchers;
        ConfigEntry {
            matchers: config.matchers.clone(),
            fetchers,
        }
    }

    /// Loads or replaces the fetchers of `config`. Returns whether the table
    /// changed.
    ///
    /// A config of another group is never loaded; if it was loaded before
    /// under this group it is removed.
    pub async fn upsert(&self, config: &DiscoveryConfig) -> bool {
        if !self.accepts(config) {
            debug!(
                discovery_config = %config.name,
                discovery_group = %config.discovery_group,
                "Ignoring discovery config of another discovery group"
            );
            return self.remove(&config.name).await;
        }

        {
            let table = self.dynamic.read().await;
            if table
                .get(&config.name)
                .is_some_and(|entry| entry.matchers == config.matchers)
            {
                return false;
            }
        }

        let entry = self.build(config);
        let count = entry.fetchers.len();
        self.dynamic.write().await.insert(config.name.clone(), entry);
        info!(
            discovery_config = %config.name,
            fetchers = count,
            "Loaded matchers from discovery config"
        );
        self.publish_size().await;
        true
    }

    /// Drops the fetchers of a config. Returns whether it was loaded.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.dynamic.write().await.remove(name).is_some();
        if removed {
            info!(discovery_config = %name, "Removed matchers of discovery config");
            self.publish_size().await;
        }
        removed
    }

    /// Replaces the dynamic table with the configs currently stored.
    pub async fn resync(&self, access_point: &dyn AccessPoint) -> DiscoveryResult<()> {
        let configs = list_all_discovery_configs(access_point).await?;
        let table: BTreeMap<String, ConfigEntry> = configs
            .iter()
            .filter(|config| self.accepts(config))
            .map(|config| (config.name.clone(), self.build(config)))
            .collect();
        info!(
            discovery_group = %self.discovery_group,
            configs = table.len(),
            "Resynced discovery configs"
        );
        *self.dynamic.write().await = table;
        self.publish_size().await;
        Ok(())
    }

    async fn publish_size(&self) {
        if let Some(metrics) = &self.metrics {
            let table = self.dynamic.read().await;
            metrics.set_dynamic_fetchers(table.values().map(|e| e.fetchers.len()).sum());
        }
    }

    /// Resolves once the table changed since the last call.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Follows DiscoveryConfig changes until `cancel` fires.
    ///
    /// Every (re)subscription is followed by a full resync, so events missed
    /// while the watch was down are not lost.
    pub async fn watch_configs(
        &self,
        access_point: Arc<dyn AccessPoint>,
        retry_interval: Duration,
        cancel: CancellationToken,
    ) {
        if self.discovery_group.is_empty() {
            return;
        }
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.follow(&*access_point, &cancel).await {
                Ok(()) => return,
                Err(err) => warn!(
                    discovery_group = %self.discovery_group,
                    error = %err,
                    retry_in = ?retry_interval,
                    "Discovery config watch failed"
                ),
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(retry_interval) => {}
            }
        }
    }

    /// One subscription. `Ok` only when cancelled.
    async fn follow(
        &self,
        access_point: &dyn AccessPoint,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<()> {
        let mut watcher = access_point.watch(&[WatchKind::DiscoveryConfig]).await?;
        self.resync(access_point).await?;
        self.changed.notify_one();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    watcher.close();
                    return Ok(());
                }
                event = watcher.next() => event,
            };
            let changed = match event {
                Some(WatchEvent::DiscoveryConfigPut(config)) => self.upsert(&config).await,
                Some(WatchEvent::DiscoveryConfigDeleted(name)) => self.remove(&name).await,
                Some(_) => false,
                None => {
                    return Err(watcher.error().unwrap_or_else(|| {
                        DiscoveryError::Connection("discovery config watch closed".to_string())
                    }));
                }
            };
            if changed {
                self.changed.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyscout_core::matcher::types;
    use skyscout_testing::fixtures::aws_matcher;
    use skyscout_testing::{FakeCloudClients, InMemoryAccessPoint, eventually};

    fn registry(group: &str) -> DynamicMatcherRegistry {
        DynamicMatcherRegistry::new(&EngineSettings::new(group), Arc::new(FakeCloudClients::new()))
    }

    fn config(name: &str, group: &str, kinds: &[&str]) -> DiscoveryConfig {
        DiscoveryConfig::new(
            name,
            group,
            Matchers {
                aws: vec![aws_matcher(kinds)],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_upsert_replaces_fetchers() {
        let reg = registry("main");
        assert!(reg.upsert(&config("dc", "main", &[types::AWS_EC2])).await);
        assert_eq!(reg.snapshot().await.len(), 1);

        // Same matchers: no rebuild.
        assert!(!reg.upsert(&config("dc", "main", &[types::AWS_EC2])).await);

        assert!(
            reg.upsert(&config("dc", "main", &[types::AWS_EC2, types::AWS_RDS]))
                .await
        );
        assert_eq!(reg.snapshot().await.len(), 2);

        assert!(reg.remove("dc").await);
        assert!(reg.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_other_groups_are_ignored() {
        let reg = registry("main");
        assert!(!reg.upsert(&config("dc", "other", &[types::AWS_EC2])).await);
        assert!(reg.snapshot().await.is_empty());

        reg.upsert(&config("dc", "main", &[types::AWS_EC2])).await;
        // Moving the config to another group unloads it.
        assert!(reg.upsert(&config("dc", "other", &[types::AWS_EC2])).await);
        assert!(reg.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_integration_only_mode() {
        let settings = EngineSettings::new("main").with_integration_only_credentials(true);
        let reg = DynamicMatcherRegistry::new(&settings, Arc::new(FakeCloudClients::new()));

        let mut with_integration = aws_matcher(&[types::AWS_RDS]);
        with_integration.integration = Some("my-integration".to_string());
        let dc = DiscoveryConfig::new(
            "dc",
            "main",
            Matchers {
                aws: vec![aws_matcher(&[types::AWS_EC2]), with_integration],
                ..Default::default()
            },
        );
        reg.upsert(&dc).await;

        let snapshot = reg.snapshot().await;
        let fetchers: Vec<_> = snapshot.all().collect();
        assert_eq!(fetchers.len(), 1);
        assert_eq!(fetchers[0].integration(), Some("my-integration"));
    }

    #[tokio::test]
    async fn test_watch_loads_and_resubscribes() {
        let ap = Arc::new(InMemoryAccessPoint::new());
        ap.put_discovery_config(config("before", "main", &[types::AWS_EC2]));
        let reg = Arc::new(registry("main"));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let reg = reg.clone();
            let ap: Arc<dyn AccessPoint> = ap.clone();
            let cancel = cancel.clone();
            async move {
                reg.watch_configs(ap, Duration::from_millis(10), cancel)
                    .await
            }
        });

        let has = |n: usize| {
            let reg = reg.clone();
            async move { reg.snapshot().await.len() == n }
        };
        assert!(eventually_async(|| has(1)).await);

        ap.put_discovery_config(config("after", "main", &[types::AWS_EC2]));
        assert!(eventually_async(|| has(2)).await);

        // Changes made while the watch is down are picked up by the resync.
        ap.fail_watchers(DiscoveryError::Connection("reset".to_string()));
        ap.delete_discovery_config("before");
        assert!(eventually_async(|| has(1)).await);
        assert!(eventually(Duration::from_secs(5), || ap.watcher_count() == 1).await);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(ap.watcher_count(), 0);
    }

    async fn eventually_async<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..500 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
