//! Ownership classification of existing inventory resources.

use skyscout_core::labels::{self, ORIGIN_CLOUD};
use skyscout_core::{DiscoveryError, OwnershipViolation, Resource};

/// How this engine may treat an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Cloud origin, stamped with this engine's group.
    Owned,
    /// Cloud origin, no group yet. The first update claims it.
    Claimable,
    /// Anything else. Never mutated.
    Foreign(OwnershipViolation),
}

/// Classifies `existing` from the point of view of `discovery_group`.
///
/// An engine running without a group owns every cloud-origin resource that
/// carries no group either.
pub fn classify(existing: &Resource, discovery_group: &str) -> Ownership {
    match existing.origin() {
        None | Some("") => return Ownership::Foreign(OwnershipViolation::MissingOrigin),
        Some(origin) if origin != ORIGIN_CLOUD => {
            return Ownership::Foreign(OwnershipViolation::NonCloudOrigin(origin.to_string()));
        }
        Some(_) => {}
    }
    match existing.discovery_group() {
        None if discovery_group.is_empty() => Ownership::Owned,
        None => Ownership::Claimable,
        Some(group) if group == discovery_group => Ownership::Owned,
        Some(group) => Ownership::Foreign(OwnershipViolation::GroupMismatch {
            expected: discovery_group.to_string(),
            found: group.to_string(),
        }),
    }
}

/// Whether a resource missing from the latest fetch may be deleted.
pub fn is_deletable(existing: &Resource, discovery_group: &str) -> bool {
    existing.origin() == Some(ORIGIN_CLOUD)
        && existing.discovery_group().unwrap_or("") == discovery_group
}

/// Stamps origin and group labels onto a freshly fetched resource.
pub fn stamp(resource: &mut Resource, discovery_group: &str) {
    let target = &mut resource.metadata.labels;
    target.insert(labels::ORIGIN.to_string(), ORIGIN_CLOUD.to_string());
    if discovery_group.is_empty() {
        target.remove(labels::DISCOVERY_GROUP);
    } else {
        target.insert(
            labels::DISCOVERY_GROUP.to_string(),
            discovery_group.to_string(),
        );
    }
}

pub(crate) fn conflict(resource: &Resource, reason: OwnershipViolation) -> DiscoveryError {
    DiscoveryError::OwnershipConflict {
        kind: resource.kind().to_string(),
        name: resource.name().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use skyscout_core::labels::{DISCOVERY_GROUP, ORIGIN};
    use skyscout_core::{AppSpec, ResourceSpec};

    fn app(origin: Option<&str>, group: Option<&str>) -> Resource {
        let mut resource = Resource::new(
            "web",
            ResourceSpec::App(AppSpec {
                uri: "http://web".to_string(),
                public_addr: String::new(),
            }),
        );
        if let Some(origin) = origin {
            resource = resource.with_label(ORIGIN, origin);
        }
        if let Some(group) = group {
            resource = resource.with_label(DISCOVERY_GROUP, group);
        }
        resource
    }

    #[rstest]
    #[case(Some("cloud"), Some("main"), Ownership::Owned)]
    #[case(Some("cloud"), None, Ownership::Claimable)]
    #[case(Some("cloud"), Some(""), Ownership::Claimable)]
    #[case(None, Some("main"), Ownership::Foreign(OwnershipViolation::MissingOrigin))]
    #[case(
        Some("config-file"),
        None,
        Ownership::Foreign(OwnershipViolation::NonCloudOrigin("config-file".to_string()))
    )]
    #[case(
        Some("cloud"),
        Some("other"),
        Ownership::Foreign(OwnershipViolation::GroupMismatch {
            expected: "main".to_string(),
            found: "other".to_string(),
        })
    )]
    fn test_classify(
        #[case] origin: Option<&str>,
        #[case] group: Option<&str>,
        #[case] expected: Ownership,
    ) {
        assert_eq!(classify(&app(origin, group), "main"), expected);
    }

    #[test]
    fn test_groupless_engine_owns_groupless_resources() {
        assert_eq!(classify(&app(Some("cloud"), None), ""), Ownership::Owned);
        assert!(matches!(
            classify(&app(Some("cloud"), Some("main")), ""),
            Ownership::Foreign(_)
        ));
    }

    #[test]
    fn test_deletion_scope() {
        assert!(is_deletable(&app(Some("cloud"), Some("main")), "main"));
        assert!(!is_deletable(&app(Some("cloud"), None), "main"));
        assert!(!is_deletable(&app(Some("dynamic"), Some("main")), "main"));
        assert!(!is_deletable(&app(Some("cloud"), Some("other")), "main"));
    }

    #[test]
    fn test_stamp() {
        let mut resource = app(None, None);
        stamp(&mut resource, "main");
        assert_eq!(classify(&resource, "main"), Ownership::Owned);
    }
}
