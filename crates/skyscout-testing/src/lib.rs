//! # Skyscout Testing
//!
//! Test doubles for every collaborator of the discovery engine:
//!
//! - [`InMemoryAccessPoint`]: linearizable inventory with watch fan-out and
//!   fault injection
//! - [`FakeCloudClients`]: scriptable, paginated cloud listings
//! - [`FakeRemoteExecutor`]: per-instance install outcomes
//! - [`RecordingAuditEmitter`] / [`RecordingUsageReporter`]
//! - [`ManualClock`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use skyscout_testing::{InMemoryAccessPoint, eventually};
//!
//! let ap = InMemoryAccessPoint::new();
//! eventually(Duration::from_secs(5), || ap.resources(ResourceKind::Node).len() == 1).await;
//! ```

pub mod access_point;
pub mod clock;
pub mod cloud;
pub mod emitters;
pub mod executor;
pub mod fixtures;

pub use access_point::{InMemoryAccessPoint, Operation};
pub use clock::ManualClock;
pub use cloud::{FakeCloudClients, Listing};
pub use emitters::{RecordingAuditEmitter, RecordingUsageReporter};
pub use executor::FakeRemoteExecutor;

use std::time::Duration;

/// Polls `condition` until it holds or `timeout` elapses. Returns whether it
/// held.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
