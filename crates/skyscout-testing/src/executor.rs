//! Scriptable remote executor.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use skyscout_core::executor::{STATUS_FAILED, STATUS_SUCCESS};
use skyscout_core::{
    DiscoveryError, DiscoveryResult, InstallOutcome, InstallRequest, RemoteExecutor,
};

#[derive(Debug, Clone)]
enum Behavior {
    Fail { exit_code: i64 },
    Error(DiscoveryError),
    Hang,
}

/// [`RemoteExecutor`] that succeeds unless told otherwise, keyed by instance.
#[derive(Debug, Default)]
pub struct FakeRemoteExecutor {
    behaviors: Mutex<HashMap<String, Behavior>>,
    requests: Mutex<Vec<InstallRequest>>,
}

impl FakeRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The command runs but the installer exits with `exit_code`.
    pub fn fail_instance(&self, instance_key: &str, exit_code: i64) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(instance_key.to_string(), Behavior::Fail { exit_code });
    }

    /// The command cannot be dispatched.
    pub fn error_instance(&self, instance_key: &str, err: DiscoveryError) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(instance_key.to_string(), Behavior::Error(err));
    }

    /// The command never completes.
    pub fn hang_instance(&self, instance_key: &str) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(instance_key.to_string(), Behavior::Hang);
    }

    /// Restores the default successful behavior for the instance.
    pub fn heal_instance(&self, instance_key: &str) {
        self.behaviors.lock().unwrap().remove(instance_key);
    }

    pub fn requests(&self) -> Vec<InstallRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Instance keys installed so far, in call order.
    pub fn installed(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.identity.instance_key())
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemoteExecutor {
    async fn run_install(&self, request: InstallRequest) -> DiscoveryResult<InstallOutcome> {
        let key = request.identity.instance_key();
        let command_id = format!("cmd-{}", self.requests.lock().unwrap().len() + 1);
        self.requests.lock().unwrap().push(request);
        let behavior = self.behaviors.lock().unwrap().get(&key).cloned();
        match behavior {
            None => Ok(InstallOutcome {
                command_id,
                exit_code: 0,
                status: STATUS_SUCCESS.to_string(),
                invocation_url: String::new(),
            }),
            Some(Behavior::Fail { exit_code }) => Ok(InstallOutcome {
                command_id,
                exit_code,
                status: STATUS_FAILED.to_string(),
                invocation_url: format!("https://console.example/commands/{key}"),
            }),
            Some(Behavior::Error(err)) => Err(err),
            Some(Behavior::Hang) => std::future::pending().await,
        }
    }
}
