//! Deterministic resource naming.
//!
//! Every engine instance derives the same name for the same cloud object, so
//! the inventory's atomic create resolves concurrent registrations to a single
//! winner.

use serde::{Deserialize, Serialize};

use crate::labels::{self, Labels};

/// Lowercases and replaces everything outside `[a-z0-9-.]` with `-`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Joins the native name with disambiguating parts, for example
/// `("orders", ["rds", "eu-west-1", "123456789012"])`.
pub fn qualified_name(native: &str, parts: &[&str]) -> String {
    let mut name = native.to_string();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        name.push('-');
        name.push_str(part);
    }
    sanitize(&name)
}

/// Cloud-native identity of a compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "cloud", rename_all = "lowercase")]
pub enum InstanceIdentity {
    Aws {
        account_id: String,
        instance_id: String,
    },
    Azure {
        subscription_id: String,
        vm_id: String,
    },
    Gcp {
        project_id: String,
        zone: String,
        name: String,
    },
}

impl InstanceIdentity {
    /// Node name registered for this instance.
    pub fn node_name(&self) -> String {
        match self {
            InstanceIdentity::Aws {
                account_id,
                instance_id,
            } => sanitize(&format!("aws-{account_id}-{instance_id}")),
            InstanceIdentity::Azure {
                subscription_id,
                vm_id,
            } => sanitize(&format!("azure-{subscription_id}-{vm_id}")),
            InstanceIdentity::Gcp {
                project_id,
                zone,
                name,
            } => sanitize(&format!("gcp-{project_id}-{zone}-{name}")),
        }
    }

    /// Key used to deduplicate install attempts and usage events.
    pub fn instance_key(&self) -> String {
        match self {
            InstanceIdentity::Aws {
                account_id,
                instance_id,
            } => format!("{account_id}/{instance_id}"),
            InstanceIdentity::Azure {
                subscription_id,
                vm_id,
            } => format!("{subscription_id}/{vm_id}"),
            InstanceIdentity::Gcp {
                project_id,
                zone,
                name,
            } => format!("{project_id}/{zone}/{name}"),
        }
    }

    /// Writes the identity labels onto a node.
    pub fn apply_labels(&self, target: &mut Labels) {
        match self {
            InstanceIdentity::Aws {
                account_id,
                instance_id,
            } => {
                target.insert(labels::AWS_ACCOUNT_ID.to_string(), account_id.clone());
                target.insert(labels::AWS_INSTANCE_ID.to_string(), instance_id.clone());
            }
            InstanceIdentity::Azure {
                subscription_id,
                vm_id,
            } => {
                target.insert(
                    labels::AZURE_SUBSCRIPTION_ID.to_string(),
                    subscription_id.clone(),
                );
                target.insert(labels::AZURE_VM_ID.to_string(), vm_id.clone());
            }
            InstanceIdentity::Gcp {
                project_id,
                zone,
                name,
            } => {
                target.insert(labels::GCP_PROJECT_ID.to_string(), project_id.clone());
                target.insert(labels::GCP_ZONE.to_string(), zone.clone());
                target.insert(labels::GCP_INSTANCE_NAME.to_string(), name.clone());
            }
        }
    }

    /// Reads an identity back from node labels, whichever cloud wrote them.
    pub fn from_labels(source: &Labels) -> Option<Self> {
        let get = |key: &str| source.get(key).filter(|v| !v.is_empty()).cloned();

        if let (Some(account_id), Some(instance_id)) =
            (get(labels::AWS_ACCOUNT_ID), get(labels::AWS_INSTANCE_ID))
        {
            return Some(InstanceIdentity::Aws {
                account_id,
                instance_id,
            });
        }
        if let (Some(subscription_id), Some(vm_id)) =
            (get(labels::AZURE_SUBSCRIPTION_ID), get(labels::AZURE_VM_ID))
        {
            return Some(InstanceIdentity::Azure {
                subscription_id,
                vm_id,
            });
        }
        if let (Some(project_id), Some(zone), Some(name)) = (
            get(labels::GCP_PROJECT_ID),
            get(labels::GCP_ZONE),
            get(labels::GCP_INSTANCE_NAME),
        ) {
            return Some(InstanceIdentity::Gcp {
                project_id,
                zone,
                name,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_node_names() {
        let aws = InstanceIdentity::Aws {
            account_id: "123456789012".to_string(),
            instance_id: "i-0abc".to_string(),
        };
        assert_eq!(aws.node_name(), "aws-123456789012-i-0abc");

        let gcp = InstanceIdentity::Gcp {
            project_id: "Proj".to_string(),
            zone: "us-central1-a".to_string(),
            name: "web 1".to_string(),
        };
        assert_eq!(gcp.node_name(), "gcp-proj-us-central1-a-web-1");
    }

    #[test]
    fn test_identity_label_roundtrip() {
        let identity = InstanceIdentity::Azure {
            subscription_id: "sub".to_string(),
            vm_id: "vm-1".to_string(),
        };
        let mut labels = Labels::new();
        identity.apply_labels(&mut labels);
        assert_eq!(InstanceIdentity::from_labels(&labels), Some(identity));
        assert_eq!(InstanceIdentity::from_labels(&Labels::new()), None);
    }

    #[test]
    fn test_qualified_name_skips_empty_parts() {
        assert_eq!(
            qualified_name("Orders_DB", &["rds", "", "eu-west-1"]),
            "orders-db-rds-eu-west-1"
        );
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(name in "[ -~]{0,40}") {
            let once = sanitize(&name);
            prop_assert_eq!(sanitize(&once), once.clone());
            prop_assert!(
                once.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
            );
        }
    }
}
