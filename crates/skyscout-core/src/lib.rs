//! # Skyscout Core
//!
//! Shared vocabulary of the Skyscout discovery engine: the resources it
//! registers, the labels that encode ownership, the matchers operators
//! configure, and the contracts of the collaborators it talks to.
//!
//! ## Ownership model
//!
//! ```text
//! ┌──────────────────────────┐  same group + cloud origin  ┌──────────┐
//! │ resource in inventory    │ ───────────────────────────▶│  Owned   │
//! │ (origin, discovery-group)│  empty group + cloud origin ┌──────────┐
//! │                          │ ───────────────────────────▶│Claimable │
//! │                          │  anything else              ┌──────────┐
//! │                          │ ───────────────────────────▶│ Foreign  │
//! └──────────────────────────┘                             └──────────┘
//! ```
//!
//! Names are derived deterministically from cloud-native identifiers (see
//! [`naming`]), so independent engines agree on the name of every object.

pub mod access_point;
pub mod clock;
pub mod discovery_config;
pub mod error;
pub mod events;
pub mod executor;
pub mod labels;
pub mod matcher;
pub mod naming;
pub mod resource;
pub mod user_task;

pub use access_point::{
    AccessPoint, DEFAULT_PAGE_SIZE, EnrollClusterResult, EnrollClustersRequest,
    EnrollClustersResponse, Page, WatchEvent, WatchKind, WatchSender, Watcher,
    list_all_discovery_configs, list_all_resources,
};
pub use clock::{Clock, SystemClock};
pub use discovery_config::{
    DiscoveryConfig, DiscoveryConfigStatus, IntegrationDiscoveredSummary,
    ResourcesDiscoveredSummary, STATE_SYNCING,
};
pub use error::{DiscoveryError, DiscoveryResult, OwnershipViolation};
pub use events::{
    AuditEmitter, AuditEvent, DiscardEmitter, DiscoveryFetchEvent, InstallRunEvent,
    ResourceCreateEvent, UsageEvent, UsageReporter,
};
pub use executor::{InstallOutcome, InstallRequest, RemoteExecutor};
pub use labels::{LabelSelector, Labels};
pub use matcher::{
    AssumeRole, AwsMatcher, AzureMatcher, Cloud, GcpMatcher, InstallParams, KubernetesMatcher,
    Matchers,
};
pub use naming::InstanceIdentity;
pub use resource::{
    AppSpec, DatabaseCloudMeta, DatabaseSpec, DiscoveredResource, KubeClusterSpec, Metadata,
    NodeSpec, Resource, ResourceKind, ResourceSpec, SummaryKind,
};
pub use user_task::{TaskState, UserTask, UserTaskFilters, UserTaskPayload};
