//! Installation, managed cluster enrollment, user tasks and usage events.

mod common;

use common::{Harness, static_settings, with_integration};

use skyscout::core::events::{INSTALL_RUN_FAILURE, INSTALL_RUN_SUCCESS};
use skyscout::core::matcher::types;
use skyscout::core::naming::qualified_name;
use skyscout::core::user_task::{
    ISSUE_EC2_SSM_INVOCATION_FAILURE, ISSUE_EKS_ENROLLMENT_FAILURE, ISSUE_RDS_IAM_AUTH_DISABLED,
    TASK_TYPE_DISCOVER_EC2, UserTaskPayload,
};
use skyscout::core::{InstanceIdentity, ResourceKind, SummaryKind, TaskState};
use skyscout::engine::InstallStatus;
use skyscout::ReconcileAction;
use skyscout_testing::{Listing, eventually};
use std::time::Duration;
use skyscout_testing::fixtures::{self, ACCOUNT_ID, REGION, aws_matcher};

const INTEGRATION: &str = "my-integration";

fn instance_key(instance_id: &str) -> String {
    format!("{ACCOUNT_ID}/{instance_id}")
}

#[tokio::test]
async fn test_one_failed_install_does_not_affect_the_others() {
    let harness = Harness::new();
    for id in ["i-1", "i-2", "i-3"] {
        harness.cloud.add_ec2(fixtures::ec2_instance(id));
    }
    harness.executor.fail_instance(&instance_key("i-2"), 1);
    let mut matcher = with_integration(aws_matcher(&[types::AWS_EC2]), INTEGRATION);
    matcher.install = Some(fixtures::install_params());
    let server = harness.server(static_settings("main", vec![matcher]));

    let report = server.run_once().await;
    assert_eq!(report.installs.succeeded().count(), 2);
    let failed: Vec<_> = report.installs.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target.instance_key(), instance_key("i-2"));
    assert!(matches!(
        &failed[0].status,
        InstallStatus::Failed { outcome: Some(outcome), .. } if outcome.exit_code == 1
    ));

    // The failed node is rolled back so the next cycle retries it.
    let nodes = harness.access_point.resources(ResourceKind::Node);
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| !n.name().contains("i-2")));

    let tasks = harness.access_point.user_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type(), TASK_TYPE_DISCOVER_EC2);
    assert_eq!(tasks[0].spec.issue_type, ISSUE_EC2_SSM_INVOCATION_FAILURE);
    assert_eq!(tasks[0].spec.state, TaskState::Open);
    match &tasks[0].spec.payload {
        UserTaskPayload::DiscoverEc2 { instances, region, .. } => {
            assert_eq!(region, REGION);
            assert_eq!(instances.keys().collect::<Vec<_>>(), vec!["i-2"]);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let runs = harness.audit.install_runs();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs.iter().filter(|r| r.code == INSTALL_RUN_SUCCESS).count(), 2);
    assert_eq!(runs.iter().filter(|r| r.code == INSTALL_RUN_FAILURE).count(), 1);

    // Fixed on the instance: the next cycle installs it, and only it.
    harness.executor.heal_instance(&instance_key("i-2"));
    let retry = server.run_once().await;
    assert_eq!(retry.installs.entries.len(), 1);
    assert_eq!(retry.installs.succeeded().count(), 1);
    assert_eq!(harness.access_point.resources(ResourceKind::Node).len(), 3);
}

#[tokio::test]
async fn test_install_uses_default_script_without_install_params() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    let server = harness.server(static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]));

    server.run_once().await;
    let requests = harness.executor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].params.script_name,
        skyscout::core::matcher::DEFAULT_INSTALL_SCRIPT
    );
    assert!(requests[0].integration.is_none());
    // Failures outside an integration are logged and audited, never tasked.
    assert!(harness.access_point.user_tasks().is_empty());
}

#[tokio::test]
async fn test_self_enrolled_instance_is_left_alone() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));

    // The agent joined on its own, under its hostname.
    let identity = InstanceIdentity::Aws {
        account_id: ACCOUNT_ID.to_string(),
        instance_id: "i-1".to_string(),
    };
    let mut agent_node = skyscout::Resource::new(
        "ip-10-0-0-1",
        skyscout::core::ResourceSpec::Node(skyscout::core::NodeSpec {
            hostname: "ip-10-0-0-1".to_string(),
            addr: "10.0.0.1".to_string(),
            identity: identity.clone(),
        }),
    );
    identity.apply_labels(&mut agent_node.metadata.labels);
    harness.access_point.insert_resource(agent_node);

    let server = harness.server(static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]));
    let report = server.run_once().await;
    assert_eq!(
        report
            .reconciled(ResourceKind::Node)
            .and_then(|r| r.outcome(&identity.node_name())),
        Some(&ReconcileAction::AlreadyEnrolled)
    );
    assert!(harness.executor.requests().is_empty());
    assert_eq!(harness.access_point.resources(ResourceKind::Node).len(), 1);
}

#[tokio::test]
async fn test_eks_clusters_go_through_the_enroller() {
    let harness = Harness::new();
    harness.cloud.add_eks(fixtures::eks_cluster("prod"));
    harness.cloud.add_eks(fixtures::eks_cluster("staging"));
    harness.access_point.fail_enrollment_of("staging", "access entry missing");
    harness.put_config(
        "eks",
        "main",
        vec![with_integration(aws_matcher(&[types::AWS_EKS]), INTEGRATION)],
    );
    let server = harness.dynamic_server("main").await;

    let report = server.run_once().await;
    assert_eq!(report.enrolled_clusters, vec!["prod".to_string()]);
    assert_eq!(report.cluster_failures.len(), 1);

    let requests = harness.access_point.enroll_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].integration, INTEGRATION);
    assert_eq!(requests[0].discovery_config.as_deref(), Some("eks"));

    let summary = harness.access_point.discovery_config("eks").unwrap().status
        .integration_discovered_resources[INTEGRATION][&SummaryKind::AwsEks];
    assert_eq!((summary.found, summary.enrolled, summary.failed), (2, 1, 1));

    let tasks = harness.access_point.user_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].spec.issue_type, ISSUE_EKS_ENROLLMENT_FAILURE);

    // "prod" is registered now: only "staging" is retried, and the enrolled
    // cluster survives reconciliation.
    server.run_once().await;
    let requests = harness.access_point.enroll_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].cluster_names, vec!["staging".to_string()]);
    let prod = qualified_name("prod", &[types::AWS_EKS, REGION, ACCOUNT_ID]);
    assert!(
        harness
            .access_point
            .resource(ResourceKind::KubeCluster, &prod)
            .is_some()
    );
}

#[tokio::test]
async fn test_eks_enrollment_failure_counts_nothing_enrolled() {
    let harness = Harness::new();
    harness.cloud.add_eks(fixtures::eks_cluster("prod"));
    harness.access_point.fail_enrollment_of("prod", "cluster is private");
    harness.put_config(
        "eks",
        "main",
        vec![with_integration(aws_matcher(&[types::AWS_EKS]), INTEGRATION)],
    );
    let server = harness.dynamic_server("main").await;

    server.run_once().await;
    let summary = harness.access_point.discovery_config("eks").unwrap().status
        .integration_discovered_resources[INTEGRATION][&SummaryKind::AwsEks];
    assert_eq!((summary.found, summary.enrolled, summary.failed), (1, 0, 1));
    assert!(harness.access_point.resources(ResourceKind::KubeCluster).is_empty());
}

#[tokio::test]
async fn test_rds_without_iam_auth_is_enrolled_and_tasked() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Rds, fixtures::rds_instance("orders", false));
    harness
        .cloud
        .add_database(Listing::Rds, fixtures::rds_instance("billing", true));
    harness.put_config(
        "rds",
        "main",
        vec![with_integration(aws_matcher(&[types::AWS_RDS]), INTEGRATION)],
    );
    let server = harness.dynamic_server("main").await;

    server.run_once().await;
    assert_eq!(harness.access_point.resources(ResourceKind::Database).len(), 2);

    let tasks = harness.access_point.user_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].spec.issue_type, ISSUE_RDS_IAM_AUTH_DISABLED);
    match &tasks[0].spec.payload {
        UserTaskPayload::DiscoverRds { databases, .. } => {
            assert_eq!(databases.keys().collect::<Vec<_>>(), vec!["orders"]);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Still failing next cycle: same task, not a second one.
    server.run_once().await;
    assert_eq!(harness.access_point.user_tasks().len(), 1);
}

#[tokio::test]
async fn test_usage_events_are_reported_once_per_resource() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    let server = harness.server(static_settings(
        "main",
        vec![aws_matcher(&[types::AWS_EC2, types::AWS_REDSHIFT])],
    ));

    server.run_once().await;
    server.run_once().await;
    let creates = harness.usage.resource_creates();
    assert_eq!(creates.len(), 2);
    let database = creates
        .iter()
        .find(|e| e.resource_type == "db")
        .expect("database usage event");
    assert_eq!(database.database_protocol.as_deref(), Some("postgres"));
    assert_eq!(database.cloud_provider, "AWS");

    harness.cloud.add_ec2(fixtures::ec2_instance("i-2"));
    server.run_once().await;
    assert_eq!(harness.usage.resource_creates().len(), 3);
    assert_eq!(harness.usage.fetch_count(), 3);
}

#[tokio::test]
async fn test_interrupted_installs_are_retried_after_restart() {
    let harness = Harness::new();
    for id in ["i-1", "i-2"] {
        harness.cloud.add_ec2(fixtures::ec2_instance(id));
        harness.executor.hang_instance(&instance_key(id));
    }
    let mut settings = static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]);
    settings.install_concurrency = 1;
    let server = harness.server(settings);

    // One install is stuck on the executor, the other waits for a permit.
    server.start().await;
    assert!(eventually(Duration::from_secs(5), || harness.executor.requests().len() == 1).await);
    server.stop().await;

    assert!(harness.access_point.resources(ResourceKind::Node).is_empty());
    assert!(harness.audit.install_runs().is_empty());

    for id in ["i-1", "i-2"] {
        harness.executor.heal_instance(&instance_key(id));
    }
    let restarted = harness.server(static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]));
    let report = restarted.run_once().await;
    assert_eq!(report.reconciled(ResourceKind::Node).unwrap().created().len(), 2);
    assert_eq!(report.installs.succeeded().count(), 2);
    assert_eq!(harness.executor.requests().len(), 3);
    assert_eq!(harness.access_point.resources(ResourceKind::Node).len(), 2);
}
