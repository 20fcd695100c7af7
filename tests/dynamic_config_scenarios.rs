//! DiscoveryConfig lifecycle, status reporting and the server loop.

mod common;

use common::{Harness, static_settings, with_integration};
use rstest::rstest;
use std::io::Write;
use std::time::Duration;

use skyscout::core::labels;
use skyscout::core::matcher::types;
use skyscout::core::{DiscoveryError, ResourceKind, STATE_SYNCING, SummaryKind};
use skyscout::{DiscoveryMetrics, EngineSettings, ReconcileAction, Server};
use skyscout_testing::fixtures::{self, aws_matcher};
use skyscout_testing::{Listing, eventually};

#[tokio::test]
async fn test_redshift_config_registers_one_database() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    harness.put_config("redshift", "main", vec![aws_matcher(&[types::AWS_REDSHIFT])]);

    let server = harness.dynamic_server("main").await;
    let report = server.run_once().await;
    assert_eq!(report.found, 1);

    let databases = harness.access_point.resources(ResourceKind::Database);
    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].origin(), Some(labels::ORIGIN_CLOUD));
    assert_eq!(databases[0].discovery_group(), Some("main"));
    assert_eq!(databases[0].discovery_config(), Some("redshift"));

    let status = harness.access_point.discovery_config("redshift").unwrap().status;
    assert_eq!(status.state, STATE_SYNCING);
    assert_eq!(status.discovered_resources, 1);
    assert!(status.integration_discovered_resources.is_empty());
}

#[tokio::test]
async fn test_configs_of_other_groups_are_ignored() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    harness.put_config("elsewhere", "other", vec![aws_matcher(&[types::AWS_REDSHIFT])]);

    let server = harness.dynamic_server("main").await;
    let report = server.run_once().await;
    assert_eq!(report.fetchers, 0);
    assert!(harness.access_point.resources(ResourceKind::Database).is_empty());
    assert!(harness.access_point.status_writes().is_empty());
}

#[tokio::test]
async fn test_config_lifecycle_with_running_server() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    let server = harness.server(
        EngineSettings::new("main").with_poll_interval(Duration::from_secs(3600)),
    );
    server.start().await;

    // The hourly tick never fires again; config events alone must drive it.
    harness.put_config("redshift", "main", vec![aws_matcher(&[types::AWS_REDSHIFT])]);
    assert!(
        eventually(Duration::from_secs(5), || {
            harness.access_point.resources(ResourceKind::Database).len() == 1
        })
        .await
    );

    harness.access_point.delete_discovery_config("redshift");
    assert!(
        eventually(Duration::from_secs(5), || {
            harness.access_point.resources(ResourceKind::Database).is_empty()
        })
        .await
    );

    server.stop().await;
    assert_eq!(harness.access_point.watcher_count(), 0);
}

#[tokio::test]
async fn test_watch_failure_resubscribes_and_resyncs() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    let mut settings = EngineSettings::new("main").with_poll_interval(Duration::from_secs(3600));
    settings.watch_retry_interval = Duration::from_millis(20);
    let server = harness.server(settings);
    server.start().await;
    assert!(eventually(Duration::from_secs(5), || harness.access_point.watcher_count() == 1).await);

    harness
        .access_point
        .fail_watchers(DiscoveryError::Connection("stream reset".to_string()));
    // Missed while the watch is down; the resync picks it up.
    harness.put_config("redshift", "main", vec![aws_matcher(&[types::AWS_REDSHIFT])]);

    assert!(
        eventually(Duration::from_secs(5), || {
            harness.access_point.resources(ResourceKind::Database).len() == 1
        })
        .await
    );
    assert_eq!(harness.access_point.watcher_count(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_status_converges_for_a_static_cloud() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    harness.cloud.add_ec2(fixtures::ec2_instance("i-2"));
    harness.put_config(
        "ec2",
        "main",
        vec![with_integration(aws_matcher(&[types::AWS_EC2]), "my-integration")],
    );
    let server = harness.dynamic_server("main").await;

    let summary = || {
        harness
            .access_point
            .discovery_config("ec2")
            .unwrap()
            .status
            .integration_discovered_resources["my-integration"][&SummaryKind::AwsEc2]
    };

    server.run_once().await;
    let first = summary();
    assert_eq!((first.found, first.enrolled, first.failed), (2, 0, 0));

    for _ in 0..2 {
        server.run_once().await;
        let steady = summary();
        assert_eq!((steady.found, steady.enrolled, steady.failed), (2, 2, 0));
    }
    let status = harness.access_point.discovery_config("ec2").unwrap().status;
    assert_eq!(status.discovered_resources, 2);
    assert!(status.last_sync_time.is_some());
}

#[tokio::test]
async fn test_status_is_written_when_nothing_is_found() {
    let harness = Harness::new();
    harness.put_config("empty", "main", vec![aws_matcher(&[types::AWS_RDS])]);
    let server = harness.dynamic_server("main").await;

    server.run_once().await;
    server.run_once().await;

    let writes = harness.access_point.status_writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|(name, status)| name == "empty"
        && status.discovered_resources == 0));
}

#[tokio::test]
async fn test_integration_only_mode_drops_ambient_matchers() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    harness.put_config(
        "mixed",
        "main",
        vec![
            aws_matcher(&[types::AWS_EC2]),
            with_integration(aws_matcher(&[types::AWS_REDSHIFT]), "my-integration"),
        ],
    );

    let settings = static_settings("main", vec![aws_matcher(&[types::AWS_EC2])])
        .with_integration_only_credentials(true);
    let server = harness.server(settings);
    assert_eq!(server.registry().static_len(), 0);
    server.sync_configs().await.unwrap();

    let report = server.run_once().await;
    assert_eq!(report.fetchers, 1);
    assert!(harness.access_point.resources(ResourceKind::Node).is_empty());
    assert_eq!(harness.access_point.resources(ResourceKind::Database).len(), 1);
}

#[tokio::test]
async fn test_construction_requires_matchers_or_group() {
    let harness = Harness::new();
    let err = Server::new(EngineSettings::default(), harness.collaborators())
        .err()
        .unwrap();
    assert!(matches!(err, DiscoveryError::BadParameter(_)));

    let invalid = EngineSettings::new("main").with_poll_interval(Duration::ZERO);
    assert!(Server::new(invalid, harness.collaborators()).is_err());

    // A group alone is enough: matchers may arrive later.
    assert!(Server::new(EngineSettings::new("main"), harness.collaborators()).is_ok());
}

#[rstest]
#[case::zero_poll_interval("poll_interval = \"0s\"")]
#[case::zero_fetch_timeout("fetch_timeout = \"0s\"")]
#[case::zero_chunk_size("reconcile_chunk_size = 0")]
#[case::zero_concurrency("install_concurrency = 0")]
#[case::bad_duration("poll_interval = \"soon\"")]
fn test_invalid_settings_are_rejected(#[case] line: &str) {
    let content = format!("discovery_group = \"main\"\n{line}\n");
    assert!(matches!(
        EngineSettings::load_from_toml(&content),
        Err(DiscoveryError::BadParameter(_))
    ));
}

#[tokio::test]
async fn test_server_from_settings_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
discovery_group = "main"
poll_interval = "10m"

[[matchers.aws]]
types = ["redshift"]
regions = ["{region}"]
tags = {{ "*" = ["*"] }}
"#,
        region = fixtures::REGION
    )
    .unwrap();
    let settings = EngineSettings::load_from_file(file.path()).unwrap();
    assert_eq!(settings.poll_interval, Duration::from_secs(600));

    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    let server = harness.server(settings);
    assert_eq!(server.registry().static_len(), 1);
    server.run_once().await;
    assert_eq!(harness.access_point.resources(ResourceKind::Database).len(), 1);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    let server = harness.server(static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]));
    let mut cycles = server.subscribe_cycles();

    server.stop().await;
    server.start().await;
    server.start().await;
    assert!(server.is_running().await);

    let report = tokio::time::timeout(Duration::from_secs(5), cycles.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.found, 1);
    assert!(!report.cancelled);

    server.stop().await;
    server.stop().await;
    assert!(!server.is_running().await);

    // Restartable.
    server.start().await;
    assert!(server.is_running().await);
    server.stop().await;
}

#[tokio::test]
async fn test_cycles_are_recorded_in_metrics() {
    let harness = Harness::new();
    harness.cloud.add_ec2(fixtures::ec2_instance("i-1"));
    let metrics = DiscoveryMetrics::new("skyscout_test").unwrap();
    let server = Server::new(
        static_settings("main", vec![aws_matcher(&[types::AWS_EC2])]),
        harness.collaborators().with_metrics(metrics.clone()),
    )
    .unwrap();

    server.run_once().await;
    server.run_once().await;
    assert_eq!(metrics.cycles(), 2);

    let text = metrics.gather_text().unwrap();
    assert!(text.contains("skyscout_test_fetch_total"));
    assert!(text.contains("skyscout_test_reconcile_total"));
}

#[tokio::test]
async fn test_overlapping_configs_settle_on_one_owner() {
    let harness = Harness::new();
    harness
        .cloud
        .add_database(Listing::Redshift, fixtures::redshift_cluster("analytics"));
    for name in ["b", "a"] {
        harness.put_config(
            name,
            "main",
            vec![with_integration(aws_matcher(&[types::AWS_REDSHIFT]), "my-integration")],
        );
    }
    let server = harness.dynamic_server("main").await;

    server.run_once().await;
    let databases = harness.access_point.resources(ResourceKind::Database);
    assert_eq!(databases.len(), 1);
    let name = databases[0].name().to_string();
    let revision = databases[0].metadata.revision.clone();
    // The lowest config name wins.
    assert_eq!(databases[0].discovery_config(), Some("a"));

    for _ in 0..10 {
        let report = server.run_once().await;
        assert_eq!(
            report
                .reconciled(ResourceKind::Database)
                .and_then(|r| r.outcome(&name)),
            Some(&ReconcileAction::Unchanged)
        );
    }
    let stored = harness
        .access_point
        .resource(ResourceKind::Database, &name)
        .unwrap();
    assert_eq!(stored.metadata.revision, revision);
    assert_eq!(stored.discovery_config(), Some("a"));

    for config in ["a", "b"] {
        let status = harness.access_point.discovery_config(config).unwrap().status;
        assert_eq!(status.discovered_resources, 1);
        let summary = status.integration_discovered_resources["my-integration"]
            [&SummaryKind::AwsOtherDatabase];
        assert_eq!((summary.found, summary.enrolled, summary.failed), (1, 1, 0));
    }
}
