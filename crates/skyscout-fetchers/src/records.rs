//! Records returned by the opaque cloud listing functions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Native tags or labels of a cloud object.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ec2Instance {
    pub instance_id: String,
    pub account_id: String,
    pub region: String,
    /// Provider state name, for example `running` or `stopped`.
    pub state: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub private_dns: String,
    #[serde(default)]
    pub tags: Tags,
}

/// An AWS database-like endpoint (RDS, Redshift, ElastiCache, MemoryDB,
/// OpenSearch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsDatabase {
    pub identifier: String,
    pub account_id: String,
    pub region: String,
    pub engine: String,
    pub endpoint: String,
    pub port: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_cluster: bool,
    #[serde(default)]
    pub iam_auth_enabled: bool,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EksCluster {
    pub name: String,
    pub account_id: String,
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureVm {
    pub vm_id: String,
    pub name: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub region: String,
    /// Power state, for example `running` or `deallocated`.
    pub power_state: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureAksCluster {
    pub name: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub region: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureRedis {
    pub name: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub region: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub provisioning_state: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceInstance {
    pub name: String,
    pub project_id: String,
    pub zone: String,
    /// Provider status, for example `RUNNING` or `TERMINATED`.
    pub status: String,
    #[serde(default)]
    pub internal_ip: String,
    #[serde(default)]
    pub labels: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GkeCluster {
    pub name: String,
    pub project_id: String,
    pub location: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeService {
    pub name: String,
    pub namespace: String,
    pub port: Option<u16>,
    /// `http`, `https` or `tcp`.
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub labels: Tags,
}
