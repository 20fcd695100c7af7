//! # Skyscout Engine
//!
//! Periodically fetches cloud resources and reconciles them into the
//! inventory, cooperating with other engines of the same discovery group.
//!
//! ```text
//!                 ┌──────────────────────────┐
//!  DiscoveryConfig│ DynamicMatcherRegistry   │◀── static matchers
//!  watch ────────▶│ config name → fetchers   │
//!                 └────────────┬─────────────┘
//!                              │ snapshot per cycle
//!                              ▼
//!  ┌────────┐  fetch   ┌──────────────────────┐ create/update/delete ┌─────────────┐
//!  │ clouds │─────────▶│ Server::run_cycle    │─────────────────────▶│ AccessPoint │
//!  └────────┘          │  OwnershipReconciler │   status, tasks      │ (inventory) │
//!                      │  Installer           │─────────────────────▶│             │
//!                      └──────────┬───────────┘                      └─────────────┘
//!                                 │ install
//!                                 ▼
//!                          RemoteExecutor
//! ```
//!
//! Ownership is decided per resource from its origin and discovery-group
//! labels (see [`ownership`]); names are derived deterministically, so
//! concurrent engines converge through conditional creates.

pub mod installer;
pub mod ownership;
pub mod reconciler;
pub mod registry;
pub mod server;
pub mod settings;
pub mod status;
pub mod tasks;
pub mod usage;

pub use installer::{InstallEntry, InstallReport, InstallStatus, InstallTarget, Installer};
pub use ownership::{Ownership, classify};
pub use reconciler::{OwnershipReconciler, ReconcileAction, ReconcileReport};
pub use registry::{DynamicMatcherRegistry, FetcherSnapshot};
pub use server::{Collaborators, CycleReport, FetchFailure, Server};
pub use settings::EngineSettings;
pub use status::{ConfigCounts, CountKey, CycleCounts, StatusReporter};
pub use tasks::{FailureTaskManager, TaskBatch, TaskScope};
pub use usage::UsageTracker;
