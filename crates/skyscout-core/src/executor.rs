//! Remote command execution used to bootstrap agents on compute instances.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryResult;
use crate::matcher::{AssumeRole, InstallParams};
use crate::naming::InstanceIdentity;

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_FAILED: &str = "Failed";

/// One agent installation on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub identity: InstanceIdentity,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assume_role: Option<AssumeRole>,
    pub params: InstallParams,
    /// Command document to run, where the cloud has such a notion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// What the remote side reported for a completed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub command_id: String,
    pub exit_code: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub invocation_url: String,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.status == STATUS_SUCCESS
    }
}

/// Runs the installer on a remote instance.
///
/// `Err` means the command could not be dispatched or observed; an `Ok`
/// outcome may still describe a failed installation.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run_install(&self, request: InstallRequest) -> DiscoveryResult<InstallOutcome>;
}
