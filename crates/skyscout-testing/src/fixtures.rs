//! Ready-made records and matchers for common scenarios.

use skyscout_core::{AwsMatcher, InstallParams, LabelSelector};
use skyscout_fetchers::records::{AwsDatabase, Ec2Instance, EksCluster};

pub const ACCOUNT_ID: &str = "123456789012";
pub const REGION: &str = "us-east-1";

/// A running EC2 instance in [`ACCOUNT_ID`] / [`REGION`].
pub fn ec2_instance(instance_id: &str) -> Ec2Instance {
    Ec2Instance {
        instance_id: instance_id.to_string(),
        account_id: ACCOUNT_ID.to_string(),
        region: REGION.to_string(),
        state: "running".to_string(),
        private_ip: "10.0.0.1".to_string(),
        private_dns: format!("{instance_id}.ec2.internal"),
        tags: [("env".to_string(), "dev".to_string())].into_iter().collect(),
    }
}

pub fn redshift_cluster(identifier: &str) -> AwsDatabase {
    AwsDatabase {
        identifier: identifier.to_string(),
        account_id: ACCOUNT_ID.to_string(),
        region: REGION.to_string(),
        engine: "redshift".to_string(),
        endpoint: format!("{identifier}.abc.{REGION}.redshift.amazonaws.com"),
        port: 5439,
        status: "available".to_string(),
        is_cluster: true,
        iam_auth_enabled: true,
        tags: Default::default(),
    }
}

pub fn rds_instance(identifier: &str, iam_auth_enabled: bool) -> AwsDatabase {
    AwsDatabase {
        identifier: identifier.to_string(),
        account_id: ACCOUNT_ID.to_string(),
        region: REGION.to_string(),
        engine: "postgres".to_string(),
        endpoint: format!("{identifier}.abc.{REGION}.rds.amazonaws.com"),
        port: 5432,
        status: "available".to_string(),
        is_cluster: false,
        iam_auth_enabled,
        tags: Default::default(),
    }
}

pub fn eks_cluster(name: &str) -> EksCluster {
    EksCluster {
        name: name.to_string(),
        account_id: ACCOUNT_ID.to_string(),
        region: REGION.to_string(),
        status: "ACTIVE".to_string(),
        tags: Default::default(),
    }
}

/// AWS matcher for `types` in [`REGION`] accepting every tag.
pub fn aws_matcher(types: &[&str]) -> AwsMatcher {
    AwsMatcher {
        types: types.iter().map(|t| t.to_string()).collect(),
        regions: vec![REGION.to_string()],
        tags: LabelSelector::any(),
        ..Default::default()
    }
}

pub fn install_params() -> InstallParams {
    InstallParams {
        join_token: "join-token".to_string(),
        script_name: "default-installer".to_string(),
        proxy_addr: None,
    }
}
