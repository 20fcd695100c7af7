//! User tasks for enrollment failures that need an operator.
//!
//! Failures are collected into a [`TaskBatch`] during a cycle and upserted
//! once at the end. The task name is derived from integration, issue type,
//! account and region, so a recurring failure updates the same task.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use skyscout_core::user_task::{
    Ec2InstanceIssue, EksClusterIssue, ISSUE_EC2_SSM_INVOCATION_FAILURE,
    ISSUE_EKS_ENROLLMENT_FAILURE, ISSUE_RDS_IAM_AUTH_DISABLED, Provenance, RdsDatabaseIssue,
};
use skyscout_core::{AccessPoint, DiscoveryResult, UserTask, UserTaskPayload};

/// Where the failing resources live.
#[derive(Debug, Clone, Copy)]
pub struct TaskScope<'a> {
    pub integration: &'a str,
    pub account_id: &'a str,
    pub region: &'a str,
}

/// Failures of one cycle, grouped by task.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    tasks: BTreeMap<String, UserTask>,
}

impl TaskBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn task(
        &mut self,
        scope: TaskScope<'_>,
        issue_type: &str,
        empty: impl FnOnce(String, String) -> UserTaskPayload,
    ) -> &mut UserTaskPayload {
        let template = UserTask::new(
            scope.integration,
            issue_type,
            empty(scope.account_id.to_string(), scope.region.to_string()),
        );
        &mut self
            .tasks
            .entry(template.name.clone())
            .or_insert(template)
            .spec
            .payload
    }

    pub fn ec2_install_failure(&mut self, scope: TaskScope<'_>, issue: Ec2InstanceIssue) {
        let payload = self.task(scope, ISSUE_EC2_SSM_INVOCATION_FAILURE, |account_id, region| {
            UserTaskPayload::DiscoverEc2 {
                account_id,
                region,
                instances: BTreeMap::new(),
            }
        });
        if let UserTaskPayload::DiscoverEc2 { instances, .. } = payload {
            instances.insert(issue.instance_id.clone(), issue);
        }
    }

    pub fn rds_iam_auth_disabled(&mut self, scope: TaskScope<'_>, issue: RdsDatabaseIssue) {
        let payload = self.task(scope, ISSUE_RDS_IAM_AUTH_DISABLED, |account_id, region| {
            UserTaskPayload::DiscoverRds {
                account_id,
                region,
                databases: BTreeMap::new(),
            }
        });
        if let UserTaskPayload::DiscoverRds { databases, .. } = payload {
            databases.insert(issue.name.clone(), issue);
        }
    }

    pub fn eks_enrollment_failure(&mut self, scope: TaskScope<'_>, issue: EksClusterIssue) {
        let payload = self.task(scope, ISSUE_EKS_ENROLLMENT_FAILURE, |account_id, region| {
            UserTaskPayload::DiscoverEks {
                account_id,
                region,
                clusters: BTreeMap::new(),
            }
        });
        if let UserTaskPayload::DiscoverEks { clusters, .. } = payload {
            clusters.insert(issue.name.clone(), issue);
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &UserTask> {
        self.tasks.values()
    }
}

pub struct FailureTaskManager {
    access_point: Arc<dyn AccessPoint>,
}

impl FailureTaskManager {
    pub fn new(access_point: Arc<dyn AccessPoint>) -> Self {
        Self { access_point }
    }

    /// Upserts every task of `batch`. Returns how many were written; failures
    /// are logged and retried by the next cycle.
    pub async fn flush(&self, batch: TaskBatch) -> usize {
        let mut written = 0;
        for task in batch.tasks.into_values() {
            let name = task.name.clone();
            match self.upsert(task).await {
                Ok(stored) => {
                    info!(
                        user_task = %name,
                        task_type = stored.task_type(),
                        issue_type = %stored.spec.issue_type,
                        affected = stored.spec.payload.len(),
                        "Upserted user task"
                    );
                    written += 1;
                }
                Err(err) => warn!(user_task = %name, error = %err, "Failed to upsert user task"),
            }
        }
        written
    }

    async fn upsert(&self, mut task: UserTask) -> DiscoveryResult<UserTask> {
        match self.access_point.get_user_task(&task.name).await {
            Ok(existing) => task.merge_existing(&existing),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        self.access_point.create_or_upsert_user_task(task).await
    }
}

/// Provenance of a resource found through `discovery_config`.
pub fn provenance(
    discovery_config: Option<&str>,
    discovery_group: &str,
    sync_time: DateTime<Utc>,
) -> Provenance {
    Provenance {
        discovery_config: discovery_config.unwrap_or_default().to_string(),
        discovery_group: discovery_group.to_string(),
        sync_time,
    }
}
