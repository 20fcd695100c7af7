//! User tasks: operator-facing, deduplicated enrollment failure records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const TASK_TYPE_DISCOVER_EC2: &str = "discover-ec2";
pub const TASK_TYPE_DISCOVER_RDS: &str = "discover-rds";
pub const TASK_TYPE_DISCOVER_EKS: &str = "discover-eks";

pub const ISSUE_EC2_SSM_INVOCATION_FAILURE: &str = "ec2-ssm-invocation-failure";
pub const ISSUE_RDS_IAM_AUTH_DISABLED: &str = "rds-iam-auth-disabled";
pub const ISSUE_EKS_ENROLLMENT_FAILURE: &str = "eks-enrollment-failure";

/// Namespace for task names. Changing it orphans every existing task.
const TASK_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_52a4_8e0c_4d4a_9d3e_2f7a_19c6_0b55);

/// Deterministic task name for a failure class.
pub fn task_name(integration: &str, issue_type: &str, account_id: &str, region: &str) -> String {
    let key = format!("{integration}|{issue_type}|{account_id}|{region}");
    Uuid::new_v5(&TASK_NAMESPACE, key.as_bytes()).to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    #[default]
    Open,
    Resolved,
}

/// Which engine run found the affected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub discovery_config: String,
    pub discovery_group: String,
    pub sync_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ec2InstanceIssue {
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_error: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdsDatabaseIssue {
    pub name: String,
    pub engine: String,
    pub is_cluster: bool,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EksClusterIssue {
    pub name: String,
    pub error: String,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Issue payload; one variant per task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "kebab-case")]
pub enum UserTaskPayload {
    DiscoverEc2 {
        account_id: String,
        region: String,
        instances: BTreeMap<String, Ec2InstanceIssue>,
    },
    DiscoverRds {
        account_id: String,
        region: String,
        databases: BTreeMap<String, RdsDatabaseIssue>,
    },
    DiscoverEks {
        account_id: String,
        region: String,
        clusters: BTreeMap<String, EksClusterIssue>,
    },
}

impl UserTaskPayload {
    pub fn task_type(&self) -> &'static str {
        match self {
            UserTaskPayload::DiscoverEc2 { .. } => TASK_TYPE_DISCOVER_EC2,
            UserTaskPayload::DiscoverRds { .. } => TASK_TYPE_DISCOVER_RDS,
            UserTaskPayload::DiscoverEks { .. } => TASK_TYPE_DISCOVER_EKS,
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            UserTaskPayload::DiscoverEc2 { account_id, .. }
            | UserTaskPayload::DiscoverRds { account_id, .. }
            | UserTaskPayload::DiscoverEks { account_id, .. } => account_id,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            UserTaskPayload::DiscoverEc2 { region, .. }
            | UserTaskPayload::DiscoverRds { region, .. }
            | UserTaskPayload::DiscoverEks { region, .. } => region,
        }
    }

    /// Number of affected resources.
    pub fn len(&self) -> usize {
        match self {
            UserTaskPayload::DiscoverEc2 { instances, .. } => instances.len(),
            UserTaskPayload::DiscoverRds { databases, .. } => databases.len(),
            UserTaskPayload::DiscoverEks { clusters, .. } => clusters.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds entries of `older` that this payload does not carry.
    ///
    /// Payloads of different task types are left untouched.
    fn absorb(&mut self, older: &UserTaskPayload) {
        match (self, older) {
            (
                UserTaskPayload::DiscoverEc2 { instances, .. },
                UserTaskPayload::DiscoverEc2 { instances: old, .. },
            ) => merge_missing(instances, old),
            (
                UserTaskPayload::DiscoverRds { databases, .. },
                UserTaskPayload::DiscoverRds { databases: old, .. },
            ) => merge_missing(databases, old),
            (
                UserTaskPayload::DiscoverEks { clusters, .. },
                UserTaskPayload::DiscoverEks { clusters: old, .. },
            ) => merge_missing(clusters, old),
            _ => {}
        }
    }
}

fn merge_missing<V: Clone>(target: &mut BTreeMap<String, V>, older: &BTreeMap<String, V>) {
    for (key, value) in older {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTaskSpec {
    pub state: TaskState,
    pub issue_type: String,
    pub integration: String,
    pub payload: UserTaskPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTask {
    pub name: String,
    pub spec: UserTaskSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl UserTask {
    /// Builds an open task whose name is derived from its identity fields.
    pub fn new(
        integration: impl Into<String>,
        issue_type: impl Into<String>,
        payload: UserTaskPayload,
    ) -> Self {
        let integration = integration.into();
        let issue_type = issue_type.into();
        let name = task_name(&integration, &issue_type, payload.account_id(), payload.region());
        Self {
            name,
            spec: UserTaskSpec {
                state: TaskState::Open,
                issue_type,
                integration,
                payload,
            },
            revision: None,
        }
    }

    pub fn task_type(&self) -> &'static str {
        self.spec.payload.task_type()
    }

    /// Folds a stored task into this one and reopens it.
    pub fn merge_existing(&mut self, existing: &UserTask) {
        self.spec.payload.absorb(&existing.spec.payload);
        self.spec.state = TaskState::Open;
        self.revision = existing.revision.clone();
    }
}

/// Filters for listing tasks; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTaskFilters {
    pub task_type: Option<String>,
    pub issue_type: Option<String>,
    pub integration: Option<String>,
    pub state: Option<TaskState>,
}

impl UserTaskFilters {
    pub fn matches(&self, task: &UserTask) -> bool {
        self.task_type.as_deref().is_none_or(|t| t == task.task_type())
            && self
                .issue_type
                .as_deref()
                .is_none_or(|i| i == task.spec.issue_type)
            && self
                .integration
                .as_deref()
                .is_none_or(|i| i == task.spec.integration)
            && self.state.is_none_or(|s| s == task.spec.state)
    }
}
