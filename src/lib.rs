//! # Skyscout
//!
//! Skyscout discovers compute instances, databases, Kubernetes clusters and
//! applications in AWS, Azure, GCP and Kubernetes, and keeps an inventory in
//! sync with what it finds. Several engines may run at once: engines sharing
//! a discovery group cooperate over the same resources, and engines of other
//! groups never touch them.
//!
//! ## Core Components
//!
//! - **[Server]**: poll loop that fetches, reconciles, installs and reports
//! - **[DynamicMatcherRegistry]**: static matchers plus those loaded from DiscoveryConfigs
//! - **[OwnershipReconciler]**: create / claim / update / reject / delete under the ownership labels
//! - **[ResourceFetcher]**: one (cloud, resource type, scope) listing
//! - **[AccessPoint]**: the inventory backend the engine writes to
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skyscout::{Collaborators, EngineSettings, Server};
//!
//! # async fn run(access_point: Arc<dyn skyscout::AccessPoint>,
//! #              clients: Arc<dyn skyscout::CloudClients>,
//! #              executor: Arc<dyn skyscout::RemoteExecutor>) -> skyscout::DiscoveryResult<()> {
//! let settings = EngineSettings::load_from_file("skyscout.toml")?;
//! let server = Server::new(settings, Collaborators::new(access_point, clients, executor))?;
//! server.start().await;
//! // ...
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use skyscout_core as core;
pub use skyscout_engine as engine;
pub use skyscout_fetchers as fetchers;

#[cfg(feature = "observability")]
pub use skyscout_observability as observability;

// ============================================================================
// Flat re-exports of the commonly used surface
// ============================================================================

pub use skyscout_core::{
    AccessPoint, AuditEmitter, Clock, DiscoveredResource, DiscoveryConfig, DiscoveryError,
    DiscoveryResult, Matchers, RemoteExecutor, Resource, ResourceKind, UsageReporter, UserTask,
};
pub use skyscout_engine::{
    Collaborators, CycleReport, DynamicMatcherRegistry, EngineSettings, OwnershipReconciler,
    ReconcileAction, Server,
};
pub use skyscout_fetchers::{CloudClients, FetcherKind, ResourceFetcher};

#[cfg(feature = "observability")]
pub use skyscout_observability::{DiscoveryMetrics, LoggingConfig, init_logging};
