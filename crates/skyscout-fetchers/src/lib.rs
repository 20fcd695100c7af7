//! # Skyscout Fetchers
//!
//! Turns matchers into fetchers and fetchers into discovered resources.
//!
//! ```text
//! Matchers ──build_fetchers──▶ [CloudFetcher; one per type × scope]
//!                                   │ fetch()
//!                                   ▼
//!                      CloudClients (opaque, paginated listing)
//!                                   │ drain pages, filter running + tags
//!                                   ▼
//!                         Vec<DiscoveredResource>
//! ```
//!
//! The cloud SDKs stay behind [`CloudClients`]; every call carries the
//! [`CloudCredentials`] (integration and assume-role) of its matcher.

pub mod builder;
pub mod clients;
mod convert;
pub mod fetcher;
pub mod kind;
pub mod records;

pub use builder::{FetcherOptions, FetcherSet, build_fetchers};
pub use clients::{AzureScope, CloudClients, CloudCredentials, drain_pages};
pub use convert::{is_running, protocol_for};
pub use fetcher::{CloudFetcher, FetchScope, ResourceFetcher};
pub use kind::FetcherKind;
